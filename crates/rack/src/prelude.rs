//! Convenience re-exports for typical use.
//!
//! ```
//! use rack::prelude::*;
//! ```

pub use crate::{
    Database, Entry, FieldKind, FieldSpec, Id, Query, RackError, Resolved, Result, SchemaRegistry,
    StoreKey, Value, UNIQUE,
};
