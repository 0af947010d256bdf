//! Foreign-key resolution.
//!
//! On read, every non-empty `fk_<view>` field expands into a
//! materialized `<view>` attached to the loaded entry: an embedded query
//! runs against the store, a key (or key list) fetches the referenced
//! entries. Resolution is one level deep — entries inside a view keep
//! their own foreign keys raw until [`Database::resolve`] is called on
//! them. A per-call in-progress key set breaks cycles with an empty view
//! and a warning.

use std::collections::HashSet;

use rack_core::codec;
use rack_core::engine::KvEngine;
use rack_core::entry::{Entry, Resolved};
use rack_core::error::{RackError, Result};
use rack_core::query::Query;

use crate::store::{filter_candidates, key_belongs, project_tag, Database};

/// A fetched foreign-key target.
enum Target {
    /// The key is already being resolved higher up the call chain.
    Cycle,
    /// A plain entry, foreign keys left raw (one-level resolution).
    Entry(Entry),
    /// A tag, projected to its (possibly resolved) data.
    Data(Resolved),
}

impl<E: KvEngine> Database<E> {
    /// Attach materialized views for every non-empty foreign-key field.
    pub(crate) fn resolve_views(
        &self,
        entry: &mut Entry,
        active: &mut HashSet<String>,
    ) -> Result<()> {
        let schema = self.registry.schema_for(entry.type_name())?;
        let foreign: Vec<(String, String)> = schema
            .foreign_fields()
            .filter_map(|f| f.view.clone().map(|view| (f.name.clone(), view)))
            .collect();

        for (field, view) in foreign {
            let raw = match entry.field(&field) {
                Some(value) if !value.is_null() => value.clone(),
                _ => continue,
            };
            if let Some(resolved) = self.resolve_fk(&field, &raw, active)? {
                entry.attach_view(view, resolved);
            }
        }
        Ok(())
    }

    /// Expand one stored foreign-key value: a query string, a lone key,
    /// or a list of keys.
    fn resolve_fk(
        &self,
        field: &str,
        raw: &serde_json::Value,
        active: &mut HashSet<String>,
    ) -> Result<Option<Resolved>> {
        match raw {
            serde_json::Value::String(text) => {
                if let Some(query) = self.classify(text)? {
                    let results = self.run_query(&query, active, false)?;
                    return Ok(Some(Resolved::Many(results)));
                }
                match self.fetch_target(text, active)? {
                    Target::Cycle => Ok(Some(Resolved::Many(Vec::new()))),
                    Target::Entry(e) => Ok(Some(Resolved::One(Box::new(e)))),
                    Target::Data(data) => Ok(Some(data)),
                }
            }
            serde_json::Value::Array(items) => {
                let mut out = Vec::new();
                for item in items {
                    let key = item.as_str().ok_or_else(|| {
                        RackError::Field(format!(
                            "foreign-key field '{}' holds a non-string key: {}",
                            field, item
                        ))
                    })?;
                    match self.fetch_target(key, active)? {
                        Target::Cycle => continue,
                        Target::Entry(e) => out.push(e),
                        Target::Data(data) => match data {
                            Resolved::One(e) => out.push(*e),
                            Resolved::Many(entries) => out.extend(entries),
                            Resolved::Value(v) => {
                                return Err(RackError::Field(format!(
                                    "tag '{}' in foreign-key field '{}' resolves to plain \
                                     data {}, not entries",
                                    key, field, v
                                )))
                            }
                        },
                    }
                }
                Ok(Some(Resolved::Many(out)))
            }
            other => Err(RackError::Field(format!(
                "foreign-key field '{}' holds {}, expected a key, key list, or query",
                field, other
            ))),
        }
    }

    /// Fetch a single referenced key, guarding the in-progress chain.
    fn fetch_target(&self, key: &str, active: &mut HashSet<String>) -> Result<Target> {
        if active.contains(key) {
            tracing::warn!(key = %key, "foreign-key cycle broken with an empty view");
            return Ok(Target::Cycle);
        }
        let raw = self
            .engine
            .get(key)?
            .ok_or_else(|| RackError::KeyNotFound(key.to_string()))?;
        let mut entry = codec::from_bytes(&raw, &self.registry)?;

        if entry.is_tag() {
            // A tag target splices in its projected data, which may
            // itself reference further keys.
            active.insert(key.to_string());
            let outcome = self.resolve_views(&mut entry, active);
            active.remove(key);
            outcome?;
            return Ok(Target::Data(project_tag(entry)));
        }
        Ok(Target::Entry(entry))
    }

    /// Eager query execution shared by `get` and the resolver.
    ///
    /// `resolve_results` controls whether matches come back with their
    /// own views attached; the resolver leaves them raw (one level deep).
    pub(crate) fn run_query(
        &self,
        query: &Query,
        active: &mut HashSet<String>,
        resolve_results: bool,
    ) -> Result<Vec<Entry>> {
        // Target naming a stored key or tag: filter its contents.
        if let Some(key) = self.target_as_key(&query.target)? {
            if active.contains(&key) {
                tracing::warn!(key = %key, "query target cycle broken with an empty result");
                return Ok(Vec::new());
            }
            let fetched = self.fetch(&key, active)?;
            let candidates = match fetched {
                Resolved::One(entry) => vec![*entry],
                Resolved::Many(entries) => entries,
                Resolved::Value(_) => Vec::new(),
            };
            return Ok(filter_candidates(query, candidates));
        }

        // Registered-type scan.
        self.registry.schema_for(&query.target)?;
        let mut out = Vec::new();
        let mut iter = self.engine.iter_keys()?;
        while let Some(key) = iter.next()? {
            if !key_belongs(&key, &query.target) {
                continue;
            }
            let raw = match self.engine.get(&key)? {
                Some(bytes) => bytes,
                None => continue,
            };
            let mut entry = codec::from_bytes(&raw, &self.registry)?;
            match rack_core::matches(query, &entry) {
                Ok(false) => continue,
                Ok(true) => {
                    if resolve_results {
                        active.insert(key.clone());
                        let outcome = self.resolve_views(&mut entry, active);
                        active.remove(&key);
                        outcome?;
                    }
                    out.push(entry);
                }
                Err(e) => {
                    tracing::debug!(key = %key, error = %e,
                        "query condition skipped a record");
                }
            }
        }
        Ok(out)
    }
}
