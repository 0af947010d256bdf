//! Storage engine contract.
//!
//! The store façade sits on top of any byte-keyed engine that offers
//! atomic single-key writes. The shipped backend is LMDB (`rack-lmdb`);
//! [`MemoryEngine`] is an insertion-ordered reference implementation used
//! in tests and as the model for the engine contract.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{RackError, Result};

/// Whether `iter_keys` reflects insertion order or the engine's own key
/// ordering. Drives the observability of the store's `sort()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrdering {
    Insertion,
    Lexicographic,
}

/// Pull-style key iterator. Implementations are finite and restartable:
/// every `iter_keys` call returns a fresh iterator.
pub trait KeyIter {
    fn next(&mut self) -> Result<Option<String>>;
}

/// A persistent string-keyed byte store.
///
/// A single `put` is atomic at the key granularity; no cross-key
/// transactions are required. The handle is a scoped resource: opened at
/// store construction, closed on `close()` or drop.
pub trait KvEngine {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Remove a key. Returns whether it was present.
    fn delete(&self, key: &str) -> Result<bool>;

    fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Fresh iterator over all keys, in the order given by `ordering()`.
    fn iter_keys(&self) -> Result<Box<dyn KeyIter + '_>>;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn ordering(&self) -> KeyOrdering;

    /// Drop every key. No prompting, no recovery.
    fn wipe(&self) -> Result<()>;

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
struct MemoryInner {
    /// First-insert order; overwrites keep the original slot.
    order: Vec<String>,
    map: HashMap<String, Vec<u8>>,
}

/// Insertion-ordered in-memory engine.
pub struct MemoryEngine {
    inner: Mutex<MemoryInner>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MemoryInner::default()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|_| RackError::Engine("memory engine lock poisoned".to_string()))
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryKeyIter {
    keys: std::vec::IntoIter<String>,
}

impl KeyIter for MemoryKeyIter {
    fn next(&mut self) -> Result<Option<String>> {
        Ok(self.keys.next())
    }
}

impl KvEngine for MemoryEngine {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.map.get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut inner = self.lock()?;
        if inner.map.insert(key.to_string(), value.to_vec()).is_none() {
            inner.order.push(key.to_string());
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        if inner.map.remove(key).is_some() {
            inner.order.retain(|k| k != key);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn iter_keys(&self) -> Result<Box<dyn KeyIter + '_>> {
        let keys = self.lock()?.order.clone();
        Ok(Box::new(MemoryKeyIter {
            keys: keys.into_iter(),
        }))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.map.len())
    }

    fn ordering(&self) -> KeyOrdering {
        KeyOrdering::Insertion
    }

    fn wipe(&self) -> Result<()> {
        let mut inner = self.lock()?;
        inner.order.clear();
        inner.map.clear();
        Ok(())
    }
}
