use lmdb::{Cursor, Database, Environment, Transaction};
use rack_core::engine::KeyIter;
use rack_core::error::{RackError, Result};
use std::sync::Arc;

/// Iterator over keys in LMDB, in lexicographic order.
///
/// Collects the key set upfront to avoid lifetime issues with LMDB
/// cursors; each `iter_keys` call snapshots the keys at that moment.
pub struct LmdbKeyIter {
    keys: std::vec::IntoIter<String>,
}

impl LmdbKeyIter {
    pub fn new(env: Arc<Environment>, db: Database) -> Result<Self> {
        let txn = env
            .begin_ro_txn()
            .map_err(|e| RackError::Engine(e.to_string()))?;
        let mut cursor = txn
            .open_ro_cursor(db)
            .map_err(|e| RackError::Engine(e.to_string()))?;

        let mut keys = Vec::new();
        for (key, _value) in cursor.iter() {
            let key = std::str::from_utf8(key)
                .map_err(|e| RackError::Serialization(e.to_string()))?
                .to_string();
            keys.push(key);
        }

        Ok(Self {
            keys: keys.into_iter(),
        })
    }
}

impl KeyIter for LmdbKeyIter {
    fn next(&mut self) -> Result<Option<String>> {
        Ok(self.keys.next())
    }
}
