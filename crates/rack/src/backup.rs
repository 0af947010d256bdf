//! Backup and restore: the whole store as JSON inside a zip archive.
//!
//! One member `{type}.json` per registered type, each a JSON array of
//! encoded entries in canonical order, plus a `_manifest.json` member
//! recording the ordered type list used at backup time. Restore wipes
//! the store and re-inserts entries under their original canonical keys.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use rack_core::codec;
use rack_core::engine::KvEngine;
use rack_core::entry::Id;
use rack_core::error::{RackError, Result, ResultExt};

use crate::store::{key_belongs, Database};

/// Archive extension: JSON in zip.
pub const ARCHIVE_EXT: &str = "jiz";

/// Name of the manifest member inside the archive.
pub const MANIFEST_MEMBER: &str = "_manifest.json";

const DEFAULT_ARCHIVE: &str = "database";

/// Archive manifest, written first so restore replays types in the
/// order they were registered at backup time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Archive format version.
    pub version: u32,

    /// Registered types in registration order, tag last.
    pub types: Vec<String>,

    /// Backup timestamp (ISO 8601).
    pub created_at: String,
}

impl BackupManifest {
    fn new(types: Vec<String>) -> Self {
        Self {
            version: 1,
            types,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl<E: KvEngine> Database<E> {
    /// Path of a named archive next to the store.
    pub fn archive_path(&self, name: Option<&str>) -> PathBuf {
        self.base()
            .join(format!("{}.{}", name.unwrap_or(DEFAULT_ARCHIVE), ARCHIVE_EXT))
    }

    /// Write the whole store to a zip archive. Returns the archive path.
    pub fn backup(&self, name: Option<&str>) -> Result<PathBuf> {
        let path = self.archive_path(name);
        let file = File::create(&path)?;
        let mut zip = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        let types: Vec<String> = self.registry.types().map(str::to_string).collect();
        let manifest = BackupManifest::new(types.clone());

        zip.start_file(MANIFEST_MEMBER, options)
            .map_err(|e| RackError::Backup(e.to_string()))?;
        zip.write_all(
            &serde_json::to_vec_pretty(&manifest)
                .map_err(|e| RackError::Serialization(e.to_string()))?,
        )?;

        for type_name in &types {
            let entries = self.stored_entries_of(type_name)?;
            zip.start_file(format!("{}.json", type_name), options)
                .map_err(|e| RackError::Backup(e.to_string()))?;
            zip.write_all(
                &serde_json::to_vec(&entries)
                    .map_err(|e| RackError::Serialization(e.to_string()))?,
            )?;
        }

        zip.finish().map_err(|e| RackError::Backup(e.to_string()))?;
        tracing::info!(path = %path.display(), "backup complete");
        Ok(path)
    }

    /// Load a zip archive: wipe the store and re-insert every entry
    /// under its original canonical key. No id reassignment. Archives
    /// containing unregistered types are rejected before anything is
    /// wiped.
    pub fn restore(&self, name: Option<&str>) -> Result<()> {
        let path = self.archive_path(name);
        if !path.is_file() {
            return Err(RackError::Restore(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let mut archive =
            ZipArchive::new(File::open(&path)?).map_err(|e| RackError::Restore(e.to_string()))?;

        let manifest: BackupManifest = {
            let mut member = archive
                .by_name(MANIFEST_MEMBER)
                .map_err(|_| RackError::Restore(format!("{} has no manifest", path.display())))?;
            let mut raw = Vec::new();
            member.read_to_end(&mut raw)?;
            serde_json::from_slice(&raw).map_err(|e| RackError::Restore(e.to_string()))?
        };

        // Every member must name a registered type.
        let member_names: Vec<String> = archive.file_names().map(str::to_string).collect();
        for member in &member_names {
            if member == MANIFEST_MEMBER {
                continue;
            }
            let type_name = member.strip_suffix(".json").ok_or_else(|| {
                RackError::Restore(format!("unexpected archive member '{}'", member))
            })?;
            if !self.registry.contains(type_name) {
                return Err(RackError::Restore(format!(
                    "archive contains entries of unregistered type '{}'",
                    type_name
                )));
            }
        }

        // Decode and validate everything before touching the store.
        let mut batch: Vec<(String, Vec<u8>)> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        for type_name in &manifest.types {
            if !self.registry.contains(type_name) {
                return Err(RackError::Restore(format!(
                    "manifest lists unregistered type '{}'",
                    type_name
                )));
            }
            let member_name = format!("{}.json", type_name);
            if !member_names.contains(&member_name) {
                continue;
            }
            let mut member = archive
                .by_name(&member_name)
                .map_err(|e| RackError::Restore(e.to_string()))?;
            let mut raw = Vec::new();
            member.read_to_end(&mut raw)?;
            let records: Vec<serde_json::Map<String, serde_json::Value>> =
                serde_json::from_slice(&raw).map_err(|e| RackError::Restore(e.to_string()))?;

            for record in records {
                let entry = codec::decode(&record, &self.registry)?;
                let key = entry.canonical_key()?;
                if !seen.insert(key.clone()) {
                    return Err(RackError::Restore(format!(
                        "archive stores '{}' twice",
                        key
                    )));
                }
                let bytes = serde_json::to_vec(&record)
                    .map_err(|e| RackError::Serialization(e.to_string()))?;
                batch.push((key, bytes));
            }
        }

        self.engine.wipe()?;
        for (key, bytes) in &batch {
            self.engine
                .put(key, bytes)
                .with_context(|| format!("restoring '{}'", key))?;
        }
        tracing::info!(path = %path.display(), entries = batch.len(), "restore complete");
        Ok(())
    }

    /// Stored records of one type in canonical order (id ascending,
    /// names lexicographic), as raw encoded maps.
    fn stored_entries_of(&self, type_name: &str) -> Result<Vec<serde_json::Value>> {
        let mut found: Vec<(IdOrder, serde_json::Value)> = Vec::new();
        let mut iter = self.engine.iter_keys()?;
        while let Some(key) = iter.next()? {
            if !key_belongs(&key, type_name) {
                continue;
            }
            let raw = match self.engine.get(&key)? {
                Some(bytes) => bytes,
                None => continue,
            };
            let entry = codec::from_bytes(&raw, &self.registry)?;
            let order = match entry.id() {
                Id::Num(n) => IdOrder::Num(*n),
                Id::Name(s) => IdOrder::Name(s.clone()),
                Id::Auto => continue,
            };
            let record = serde_json::from_slice(&raw)
                .map_err(|e| RackError::Serialization(e.to_string()))?;
            found.push((order, record));
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, record)| record).collect())
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
enum IdOrder {
    Num(u64),
    Name(String),
}
