//! LMDB-backed key/value engine for the rack document store.
//!
//! Implements the [`rack_core::engine::KvEngine`] contract over a single
//! named LMDB database: byte-keyed get/put/delete with atomic single-key
//! writes and lexicographic key iteration.

mod config;
mod engine;
mod iter;

pub use config::{KvConfig, SyncMode};
pub use engine::LmdbEngine;
pub use iter::LmdbKeyIter;

#[cfg(test)]
mod tests {
    use super::*;
    use rack_core::engine::{KeyOrdering, KvEngine};

    fn open_engine(dir: &tempfile::TempDir) -> LmdbEngine {
        LmdbEngine::open(KvConfig::new(dir.path().to_path_buf())).unwrap()
    }

    #[test]
    fn put_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);

        engine.put("book_0", b"{}").unwrap();
        assert_eq!(engine.get("book_0").unwrap(), Some(b"{}".to_vec()));
        assert!(engine.contains("book_0").unwrap());

        assert!(engine.delete("book_0").unwrap());
        assert!(!engine.delete("book_0").unwrap());
        assert_eq!(engine.get("book_0").unwrap(), None);
    }

    #[test]
    fn keys_iterate_in_lexicographic_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        assert_eq!(engine.ordering(), KeyOrdering::Lexicographic);

        engine.put("book_2", b"b").unwrap();
        engine.put("author_0", b"a").unwrap();
        engine.put("book_0", b"c").unwrap();

        let mut iter = engine.iter_keys().unwrap();
        let mut keys = Vec::new();
        while let Some(key) = iter.next().unwrap() {
            keys.push(key);
        }
        assert_eq!(keys, vec!["author_0", "book_0", "book_2"]);
        assert_eq!(engine.len().unwrap(), 3);
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let engine = open_engine(&dir);
            engine.put("book_0", b"persisted").unwrap();
            engine.close().unwrap();
        }
        let engine = open_engine(&dir);
        assert_eq!(engine.get("book_0").unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn wipe_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let engine = open_engine(&dir);
        engine.put("a", b"1").unwrap();
        engine.put("b", b"2").unwrap();
        engine.wipe().unwrap();
        assert!(engine.is_empty().unwrap());
    }
}
