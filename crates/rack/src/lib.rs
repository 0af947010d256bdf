//! Rack: an embedded, single-process document store over a persistent
//! key/value file.
//!
//! Entries are user-defined record types keyed by a deterministic
//! `"{type}_{id}"` identity string. Foreign-key fields (`fk_<view>`)
//! hold key lists or embedded queries and expand lazily on read into a
//! materialized `<view>`. A query string is a first-class key: reading
//! the store with one returns the matching entries.
//!
//! # Quick Start
//!
//! ```no_run
//! use rack::prelude::*;
//!
//! # fn main() -> rack::Result<()> {
//! let mut registry = SchemaRegistry::new();
//! registry.register(
//!     "book",
//!     vec![
//!         FieldSpec::required("title", FieldKind::Str),
//!         FieldSpec::required("author", FieldKind::Str),
//!         FieldSpec::optional("rating", FieldKind::Int, serde_json::json!(0)),
//!     ],
//! )?;
//!
//! let db = Database::open("./data", registry)?;
//!
//! // UNIQUE key + UNIQUE id: stored under "book_0"
//! let book = db.put(
//!     UNIQUE,
//!     Entry::auto("book")
//!         .with("title", "The A")
//!         .with("author", "A.B. Cee")
//!         .with("rating", 4),
//! )?;
//! assert_eq!(book.canonical_key()?, "book_0");
//!
//! // A query string is a key
//! let hits = db.get("book: rating >= 4")?;
//! assert_eq!(hits.entries().len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod backup;
pub mod prelude;
mod resolve;
mod store;

pub use backup::{BackupManifest, ARCHIVE_EXT, MANIFEST_MEMBER};
pub use store::{Database, Items, Keys, QueryIter, StoreKey, Values, UNIQUE};

// Re-export core types
pub use rack_core::{
    canonical_key, codec, matches, Cmp, Condition, Entry, FieldKind, FieldSpec, Id, KeyIter,
    KeyOrdering, KvEngine, MemoryEngine, Op, Operand, Query, RackError, Resolved, Result,
    ResultExt, Schema, SchemaRegistry, Value, FK_PREFIX, KEY_SEP, TAG_TYPE,
};
pub use rack_lmdb::{KvConfig, LmdbEngine, SyncMode};
