use lmdb::{
    Cursor, Database, DatabaseFlags, Environment, EnvironmentFlags, Transaction, WriteFlags,
};
use rack_core::engine::{KeyIter, KeyOrdering, KvEngine};
use rack_core::error::{RackError, Result};
use std::sync::Arc;

use crate::config::{KvConfig, SyncMode};
use crate::iter::LmdbKeyIter;

/// LMDB-backed key/value engine.
///
/// One named database inside a single environment. Every `put` commits
/// its own write transaction, which makes single-key writes atomic and
/// durable per the configured [`SyncMode`]. Key iteration is in LMDB's
/// lexicographic key order.
pub struct LmdbEngine {
    env: Arc<Environment>,
    db: Database,
}

impl LmdbEngine {
    pub fn open(cfg: KvConfig) -> Result<Self> {
        std::fs::create_dir_all(&cfg.path)?;

        let mut env_builder = Environment::new();
        env_builder.set_max_dbs(1);
        env_builder.set_map_size(cfg.map_size);
        env_builder.set_max_readers(cfg.max_readers);

        let mut flags = EnvironmentFlags::empty();
        match cfg.sync_mode {
            SyncMode::Full => {}
            SyncMode::NoMetaSync => {
                flags.insert(EnvironmentFlags::NO_META_SYNC);
            }
            SyncMode::NoSync => {
                flags.insert(EnvironmentFlags::NO_SYNC);
            }
        }
        env_builder.set_flags(flags);

        let env = env_builder
            .open(&cfg.path)
            .map_err(|e| RackError::Io(std::io::Error::other(e)))?;

        let db = env
            .create_db(Some("entries"), DatabaseFlags::empty())
            .map_err(|e| RackError::Engine(e.to_string()))?;

        Ok(Self {
            env: Arc::new(env),
            db,
        })
    }
}

impl KvEngine for LmdbEngine {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| RackError::Engine(e.to_string()))?;
        match txn.get(self.db, &key) {
            Ok(bytes) => Ok(Some(bytes.to_vec())),
            Err(lmdb::Error::NotFound) => Ok(None),
            Err(e) => Err(RackError::Engine(e.to_string())),
        }
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| RackError::Engine(e.to_string()))?;
        txn.put(self.db, &key, &value, WriteFlags::empty())
            .map_err(|e| RackError::Engine(e.to_string()))?;
        txn.commit().map_err(|e| RackError::Engine(e.to_string()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| RackError::Engine(e.to_string()))?;
        match txn.del(self.db, &key, None) {
            Ok(()) => {
                txn.commit().map_err(|e| RackError::Engine(e.to_string()))?;
                Ok(true)
            }
            Err(lmdb::Error::NotFound) => Ok(false),
            Err(e) => Err(RackError::Engine(e.to_string())),
        }
    }

    fn iter_keys(&self) -> Result<Box<dyn KeyIter + '_>> {
        Ok(Box::new(LmdbKeyIter::new(self.env.clone(), self.db)?))
    }

    fn len(&self) -> Result<usize> {
        let txn = self
            .env
            .begin_ro_txn()
            .map_err(|e| RackError::Engine(e.to_string()))?;
        let mut cursor = txn
            .open_ro_cursor(self.db)
            .map_err(|e| RackError::Engine(e.to_string()))?;
        Ok(cursor.iter().count())
    }

    fn ordering(&self) -> KeyOrdering {
        KeyOrdering::Lexicographic
    }

    fn wipe(&self) -> Result<()> {
        let mut txn = self
            .env
            .begin_rw_txn()
            .map_err(|e| RackError::Engine(e.to_string()))?;
        txn.clear_db(self.db)
            .map_err(|e| RackError::Engine(e.to_string()))?;
        txn.commit().map_err(|e| RackError::Engine(e.to_string()))
    }

    fn close(&self) -> Result<()> {
        // LMDB closes automatically on drop
        Ok(())
    }
}
