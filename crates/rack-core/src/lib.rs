//! Rack Core: types and contracts for the rack document store
//!
//! This crate defines the storage-independent half of rack:
//! - **Schema registry**: per-store registration of record types with an
//!   ordered field descriptor table
//! - **Entry model**: dynamic records, the UNIQUE id sentinel, canonical
//!   `"{type}_{id}"` keys, materialized foreign-key views
//! - **Entry codec**: JSON encoding with envelope enforcement, defaults,
//!   and strict field validation
//! - **Query language**: lexer, parser, AST, evaluator, and the
//!   `statement` template formatter
//! - **Engine contract**: the [`engine::KvEngine`] trait implemented by
//!   storage backends (`rack-lmdb`), plus an insertion-ordered in-memory
//!   reference engine

pub mod codec;
pub mod engine;
pub mod entry;
pub mod error;
pub mod query;
pub mod schema;
pub mod value;

pub use engine::{KeyIter, KeyOrdering, KvEngine, MemoryEngine};
pub use entry::{canonical_key, Entry, Id, Resolved, KEY_SEP};
pub use error::{RackError, Result, ResultExt};
pub use query::{matches, Cmp, Condition, Op, Operand, Query};
pub use schema::{FieldKind, FieldSpec, Schema, SchemaRegistry, FK_PREFIX, TAG_TYPE};
pub use value::Value;
