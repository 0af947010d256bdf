//! The store façade.
//!
//! [`Database`] exposes mapping-style access over any [`KvEngine`]:
//! `get`/`put`/`delete`, lazy iteration, the UNIQUE id protocol, the
//! scan-based query executor, and sort/backup/restore. Keys passed to
//! `get` are classified as canonical keys, tag names, or query strings.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rack_core::codec;
use rack_core::engine::{KeyIter, KeyOrdering, KvEngine};
use rack_core::entry::{Entry, Id, Resolved};
use rack_core::error::{RackError, Result};
use rack_core::query::Query;
use rack_core::schema::{SchemaRegistry, TAG_TYPE};
use rack_core::KEY_SEP;
use rack_lmdb::{KvConfig, LmdbEngine};

/// Key argument of a `put`.
///
/// `Unique` derives the canonical key from the value, assigning the next
/// free id when the entry still carries the UNIQUE sentinel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreKey {
    Unique,
    Literal(String),
}

/// The UNIQUE sentinel in key position.
pub const UNIQUE: StoreKey = StoreKey::Unique;

impl From<&str> for StoreKey {
    fn from(key: &str) -> Self {
        StoreKey::Literal(key.to_string())
    }
}

impl From<String> for StoreKey {
    fn from(key: String) -> Self {
        StoreKey::Literal(key)
    }
}

/// An embedded document store over a persistent key/value engine.
///
/// Single-process, single-threaded by contract: no internal locking
/// beyond what the engine provides. The schema registry is injected at
/// construction and owned by the store.
pub struct Database<E: KvEngine = LmdbEngine> {
    pub(crate) engine: E,
    pub(crate) registry: SchemaRegistry,
    base: PathBuf,
    /// Entries removed via `delete`, parked until `empty_bin` or drop.
    bin: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl Database<LmdbEngine> {
    /// Open (or create) a store in `path` with the LMDB engine.
    ///
    /// A brand-new store attempts a restore from the default archive
    /// before starting empty, so a wiped data directory can be rebuilt
    /// from its last backup.
    pub fn open<P: AsRef<Path>>(path: P, registry: SchemaRegistry) -> Result<Self> {
        Self::open_with(path, registry, false)
    }

    /// Open with an explicit wipe: truncates the store without prompting.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        registry: SchemaRegistry,
        wipe: bool,
    ) -> Result<Self> {
        let base = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&base)?;

        let kv_dir = base.join("kv");
        let fresh = !kv_dir.join("data.mdb").exists();
        let engine = LmdbEngine::open(KvConfig::new(kv_dir))?;
        let db = Database::with_engine(engine, registry, base);

        if wipe {
            db.wipe()?;
        } else if fresh {
            let archive = db.archive_path(None);
            if archive.exists() {
                if let Err(e) = db.restore(None) {
                    tracing::warn!(archive = %archive.display(), error = %e,
                        "restore of fresh store failed, starting empty");
                    db.wipe()?;
                }
            }
        }
        Ok(db)
    }
}

impl<E: KvEngine> Database<E> {
    /// Wrap an already-open engine. `base` is where backup archives live.
    pub fn with_engine<P: AsRef<Path>>(engine: E, registry: SchemaRegistry, base: P) -> Self {
        Self {
            engine,
            registry,
            base: base.as_ref().to_path_buf(),
            bin: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Key ordering reported by the underlying engine.
    pub fn engine_ordering(&self) -> KeyOrdering {
        self.engine.ordering()
    }

    pub(crate) fn base(&self) -> &Path {
        &self.base
    }

    // READS

    /// Read by key.
    ///
    /// - canonical key: the decoded entry with foreign-key views resolved
    /// - tag name (bare or `tag_`-prefixed): the tag's `data`
    /// - query string: the list of matching entries
    pub fn get(&self, key: &str) -> Result<Resolved> {
        if let Some(query) = self.classify(key)? {
            let mut active = HashSet::new();
            return Ok(Resolved::Many(self.run_query(&query, &mut active, true)?));
        }
        self.fetch(key, &mut HashSet::new())
    }

    /// First match of a query, or the addressed value; `None` instead of
    /// an error when nothing is found.
    pub fn exists(&self, key_or_query: &str) -> Result<Option<Resolved>> {
        if let Some(query) = self.classify(key_or_query)? {
            let mut active = HashSet::new();
            let mut found = self.run_query(&query, &mut active, true)?;
            if found.is_empty() {
                return Ok(None);
            }
            return Ok(Some(Resolved::One(Box::new(found.remove(0)))));
        }
        match self.fetch(key_or_query, &mut HashSet::new()) {
            Ok(value) => Ok(Some(value)),
            Err(RackError::KeyNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a literal key (or tag name) is present.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.engine.contains(key)? || self.engine.contains(&tag_key(key))?)
    }

    /// Resolve the foreign-key views of an entry in place. Entries inside
    /// a view are loaded one level deep; calling this on one of them
    /// triggers its own resolution.
    pub fn resolve(&self, entry: &mut Entry) -> Result<()> {
        let mut active = HashSet::new();
        if let Ok(key) = entry.canonical_key() {
            active.insert(key);
        }
        self.resolve_views(entry, &mut active)
    }

    // WRITES

    /// Store an entry.
    ///
    /// With [`UNIQUE`] the canonical key is derived from the value; an
    /// entry still carrying the UNIQUE id sentinel is assigned
    /// `next_id(type)` first. A literal key must agree with the value's
    /// canonical key. Returns the stored entry, ids assigned.
    pub fn put(&self, key: impl Into<StoreKey>, mut entry: Entry) -> Result<Entry> {
        self.registry.schema_for(entry.type_name())?;
        let key = key.into();

        if entry.id().is_auto() {
            let adopted = match &key {
                StoreKey::Literal(k) => id_from_key(k, entry.type_name(), entry.is_tag()),
                StoreKey::Unique => None,
            };
            match adopted {
                Some(id) => entry.set_id(id),
                None => entry.set_id(Id::Num(self.next_id(entry.type_name())?)),
            }
        }

        let canonical = entry.canonical_key()?;
        if let StoreKey::Literal(k) = &key {
            if *k != canonical {
                return Err(RackError::KeyMismatch {
                    key: k.clone(),
                    canonical,
                });
            }
        }

        let bytes = codec::to_bytes(&entry, &self.registry)?;
        self.engine.put(&canonical, &bytes)?;
        Ok(entry)
    }

    /// Delete by literal key. The removed entry is parked in the session
    /// bin until `empty_bin` or drop.
    pub fn delete(&self, key: &str) -> Result<()> {
        let raw = self
            .engine
            .get(key)?
            .ok_or_else(|| RackError::KeyNotFound(key.to_string()))?;
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&raw) {
            self.bin.lock().unwrap().insert(key.to_string(), json);
        }
        self.engine.delete(key)?;
        Ok(())
    }

    /// Install a tag under `"tag_{name}"` only if that key is absent.
    /// Returns whether anything was written. Used for persisted tags
    /// whose `fk_data` is a query, so the query re-runs on later reads.
    pub fn make_once(&self, name: &str, mut entry: Entry) -> Result<bool> {
        if !entry.is_tag() {
            return Err(RackError::Schema(format!(
                "make_once installs tags, got type '{}'",
                entry.type_name()
            )));
        }
        let key = tag_key(name);
        if self.engine.contains(&key)? {
            return Ok(false);
        }
        entry.set_id(Id::Name(name.to_string()));
        self.put(StoreKey::Literal(key), entry)?;
        Ok(true)
    }

    // IDS AND COUNTS

    /// Next free id for a type: `max(stored ids) + 1`, or `0` when none
    /// exist. A linear scan over the type's key prefix; no index.
    pub fn next_id(&self, type_name: &str) -> Result<u64> {
        self.registry.schema_for(type_name)?;
        let prefix = format!("{}{}", type_name, KEY_SEP);
        let mut max: Option<u64> = None;
        let mut iter = self.engine.iter_keys()?;
        while let Some(key) = iter.next()? {
            if let Some(rest) = key.strip_prefix(&prefix) {
                if let Ok(id) = rest.parse::<u64>() {
                    max = Some(max.map_or(id, |m| m.max(id)));
                }
            }
        }
        Ok(max.map_or(0, |m| m + 1))
    }

    /// Whether an id is still free for a type.
    pub fn is_unique_id(&self, type_name: &str, id: u64) -> Result<bool> {
        let key = rack_core::canonical_key(type_name, &Id::Num(id))?;
        Ok(!self.engine.contains(&key)?)
    }

    /// Number of stored entries of a type.
    pub fn count(&self, type_name: &str) -> Result<usize> {
        self.registry.schema_for(type_name)?;
        let mut n = 0;
        let mut iter = self.engine.iter_keys()?;
        while let Some(key) = iter.next()? {
            if key_belongs(&key, type_name) {
                n += 1;
            }
        }
        Ok(n)
    }

    // ITERATION

    /// All keys, in engine order. A fresh iterator per call.
    pub fn keys(&self) -> Result<Keys<'_>> {
        Ok(Keys {
            iter: self.engine.iter_keys()?,
            type_filter: None,
        })
    }

    /// Keys of one type.
    pub fn keys_of(&self, type_name: &str) -> Result<Keys<'_>> {
        self.registry.schema_for(type_name)?;
        Ok(Keys {
            iter: self.engine.iter_keys()?,
            type_filter: Some(type_name.to_string()),
        })
    }

    /// All values, in engine order. Tags project to their `data`.
    pub fn values(&self) -> Result<Values<'_, E>> {
        Ok(Values {
            db: self,
            keys: self.keys()?,
        })
    }

    /// All `(key, value)` pairs, in engine order.
    pub fn items(&self) -> Result<Items<'_, E>> {
        Ok(Items {
            db: self,
            keys: self.keys()?,
        })
    }

    /// Lazily evaluate a query: a single pass over the candidate keys.
    pub fn query_all(&self, query: &str) -> Result<QueryIter<'_, E>> {
        let query = Query::parse(query)?;

        // A target naming a stored key or tag filters that value's
        // current contents instead of scanning.
        if let Some(key) = self.target_as_key(&query.target)? {
            let fetched = self.fetch(&key, &mut HashSet::new())?;
            let candidates = match fetched {
                Resolved::One(entry) => vec![*entry],
                Resolved::Many(entries) => entries,
                Resolved::Value(_) => Vec::new(),
            };
            let kept = filter_candidates(&query, candidates);
            return Ok(QueryIter {
                db: self,
                query,
                mode: QueryMode::Filtered(kept.into_iter()),
            });
        }

        self.registry.schema_for(&query.target)?;
        Ok(QueryIter {
            db: self,
            mode: QueryMode::Scan(self.engine.iter_keys()?),
            query,
        })
    }

    // MAINTENANCE

    /// Rewrite the store so iteration yields entries grouped by schema
    /// registration order, then id ascending, tags last by name. A no-op
    /// when the engine iterates in its own key order.
    pub fn sort(&self) -> Result<()> {
        if self.engine.ordering() != KeyOrdering::Insertion {
            return Ok(());
        }

        let mut buckets: Vec<(usize, SortId, String, Vec<u8>)> = Vec::new();
        let mut iter = self.engine.iter_keys()?;
        while let Some(key) = iter.next()? {
            let raw = match self.engine.get(&key)? {
                Some(bytes) => bytes,
                None => continue,
            };
            let entry = codec::from_bytes(&raw, &self.registry)?;
            let index = self.registry.schema_for(entry.type_name())?.index();
            let sort_id = match entry.id() {
                Id::Num(n) => SortId::Num(*n),
                Id::Name(s) => SortId::Name(s.clone()),
                Id::Auto => continue,
            };
            buckets.push((index, sort_id, key, raw));
        }
        drop(iter);

        buckets.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

        self.engine.wipe()?;
        for (_, _, key, raw) in buckets {
            self.engine.put(&key, &raw)?;
        }
        Ok(())
    }

    /// Drop every stored entry. No prompting.
    pub fn wipe(&self) -> Result<()> {
        self.engine.wipe()?;
        tracing::info!("store wiped");
        Ok(())
    }

    /// Snapshot of the session bin: entries removed by `delete` since
    /// the store opened (or the bin was last emptied).
    pub fn session_bin(&self) -> Vec<(String, serde_json::Value)> {
        self.bin
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn empty_bin(&self) {
        self.bin.lock().unwrap().clear();
    }

    /// The whole store as a JSON object, key to stored record.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        let mut iter = self.engine.iter_keys()?;
        while let Some(key) = iter.next()? {
            if let Some(raw) = self.engine.get(&key)? {
                let value = serde_json::from_slice(&raw)
                    .map_err(|e| RackError::Serialization(e.to_string()))?;
                map.insert(key, value);
            }
        }
        Ok(serde_json::Value::Object(map))
    }

    /// Release the engine handle.
    pub fn close(self) -> Result<()> {
        self.engine.close()
    }

    // INTERNAL

    /// Query classification: a string is a query iff it contains `:` and
    /// the prefix before the first `:` is a registered type or an
    /// existing (tag) key. Anything else is a literal key.
    pub(crate) fn classify(&self, input: &str) -> Result<Option<Query>> {
        let Some((target, _)) = Query::split_target(input) else {
            return Ok(None);
        };
        let known = self.registry.contains(target) || self.target_as_key(target)?.is_some();
        if !known {
            return Ok(None);
        }
        Query::parse(input).map(Some)
    }

    /// The stored key a query target addresses, if any: the target
    /// verbatim, or a tag key.
    pub(crate) fn target_as_key(&self, target: &str) -> Result<Option<String>> {
        if self.engine.contains(target)? {
            return Ok(Some(target.to_string()));
        }
        let tagged = tag_key(target);
        if self.engine.contains(&tagged)? {
            return Ok(Some(tagged));
        }
        Ok(None)
    }

    /// Fetch a literal key (with the tag-name shorthand), decode, resolve
    /// views, and project tags to their data.
    pub(crate) fn fetch(&self, key: &str, active: &mut HashSet<String>) -> Result<Resolved> {
        let raw = match self.engine.get(key)? {
            Some(bytes) => bytes,
            None => self
                .engine
                .get(&tag_key(key))?
                .ok_or_else(|| RackError::KeyNotFound(key.to_string()))?,
        };
        let mut entry = codec::from_bytes(&raw, &self.registry)?;
        let canonical = entry.canonical_key()?;

        active.insert(canonical.clone());
        let outcome = self.resolve_views(&mut entry, active);
        active.remove(&canonical);
        outcome?;

        if entry.is_tag() {
            Ok(project_tag(entry))
        } else {
            Ok(Resolved::One(Box::new(entry)))
        }
    }
}

fn tag_key(name: &str) -> String {
    format!("{}{}{}", TAG_TYPE, KEY_SEP, name)
}

/// Whether a stored key belongs to a type's namespace. Numeric suffixes
/// only for user types, so `book_` does not claim keys of a type named
/// `book_club`; tags accept any name suffix.
pub(crate) fn key_belongs(key: &str, type_name: &str) -> bool {
    let Some(rest) = key.strip_prefix(type_name) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix(KEY_SEP) else {
        return false;
    };
    type_name == TAG_TYPE || rest.parse::<u64>().is_ok()
}

fn id_from_key(key: &str, type_name: &str, is_tag: bool) -> Option<Id> {
    let rest = key
        .strip_prefix(type_name)?
        .strip_prefix(KEY_SEP)
        .filter(|r| !r.is_empty())?;
    match rest.parse::<u64>() {
        Ok(n) => Some(Id::Num(n)),
        Err(_) if is_tag => Some(Id::Name(rest.to_string())),
        Err(_) => None,
    }
}

/// Tag projection: the resolved `fk_data` view when present, otherwise
/// the plain `data` field.
pub(crate) fn project_tag(entry: Entry) -> Resolved {
    if let Some(view) = entry.view("data") {
        return view.clone();
    }
    Resolved::Value(
        entry
            .field("data")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
    )
}

/// Evaluate conditions over already-loaded candidates. Evaluation errors
/// demote the record to a non-match with a diagnostic.
pub(crate) fn filter_candidates(query: &Query, candidates: Vec<Entry>) -> Vec<Entry> {
    candidates
        .into_iter()
        .filter(|entry| match rack_core::matches(query, entry) {
            Ok(keep) => keep,
            Err(e) => {
                tracing::debug!(target_type = entry.type_name(), error = %e,
                    "query condition skipped a record");
                false
            }
        })
        .collect()
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum SortId {
    Num(u64),
    Name(String),
}

/// Key iterator, optionally filtered to one type's namespace.
pub struct Keys<'a> {
    iter: Box<dyn KeyIter + 'a>,
    type_filter: Option<String>,
}

impl Iterator for Keys<'_> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.iter.next() {
                Err(e) => return Some(Err(e)),
                Ok(None) => return None,
                Ok(Some(key)) => match &self.type_filter {
                    Some(t) if !key_belongs(&key, t) => continue,
                    _ => return Some(Ok(key)),
                },
            }
        }
    }
}

/// Lazy iterator over stored values. Tags project to their `data`.
pub struct Values<'a, E: KvEngine> {
    db: &'a Database<E>,
    keys: Keys<'a>,
}

impl<E: KvEngine> Iterator for Values<'_, E> {
    type Item = Result<Resolved>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = match self.keys.next()? {
            Ok(key) => key,
            Err(e) => return Some(Err(e)),
        };
        Some(self.db.fetch(&key, &mut HashSet::new()))
    }
}

/// Lazy iterator over `(key, value)` pairs.
pub struct Items<'a, E: KvEngine> {
    db: &'a Database<E>,
    keys: Keys<'a>,
}

impl<E: KvEngine> Iterator for Items<'_, E> {
    type Item = Result<(String, Resolved)>;

    fn next(&mut self) -> Option<Self::Item> {
        let key = match self.keys.next()? {
            Ok(key) => key,
            Err(e) => return Some(Err(e)),
        };
        Some(
            self.db
                .fetch(&key, &mut HashSet::new())
                .map(|value| (key, value)),
        )
    }
}

enum QueryMode<'a> {
    /// Target named a stored key or tag: its contents, pre-filtered.
    Filtered(std::vec::IntoIter<Entry>),
    /// Target named a registered type: single-pass key scan.
    Scan(Box<dyn KeyIter + 'a>),
}

/// Lazy query executor. Matching entries are yielded with their
/// foreign-key views resolved.
pub struct QueryIter<'a, E: KvEngine> {
    db: &'a Database<E>,
    query: Query,
    mode: QueryMode<'a>,
}

impl<E: KvEngine> Iterator for QueryIter<'_, E> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.mode {
            QueryMode::Filtered(entries) => entries.next().map(Ok),
            QueryMode::Scan(keys) => loop {
                let key = match keys.next() {
                    Err(e) => return Some(Err(e)),
                    Ok(None) => return None,
                    Ok(Some(key)) => key,
                };
                if !key_belongs(&key, &self.query.target) {
                    continue;
                }
                let raw = match self.db.engine.get(&key) {
                    Err(e) => return Some(Err(e)),
                    Ok(None) => continue,
                    Ok(Some(bytes)) => bytes,
                };
                let mut entry = match codec::from_bytes(&raw, &self.db.registry) {
                    Err(e) => return Some(Err(e)),
                    Ok(entry) => entry,
                };
                match rack_core::matches(&self.query, &entry) {
                    Ok(false) => continue,
                    Ok(true) => {
                        let mut active = HashSet::from([key]);
                        if let Err(e) = self.db.resolve_views(&mut entry, &mut active) {
                            return Some(Err(e));
                        }
                        return Some(Ok(entry));
                    }
                    Err(e) => {
                        tracing::debug!(key = %key, error = %e,
                            "query condition skipped a record");
                        continue;
                    }
                }
            },
        }
    }
}

impl<E: KvEngine> fmt::Display for Database<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self
            .to_json()
            .ok()
            .and_then(|v| serde_json::to_string_pretty(&v).ok())
        {
            Some(rendered) => f.write_str(&rendered),
            None => f.write_str("{}"),
        }
    }
}
