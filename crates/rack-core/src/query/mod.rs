//! The textual query language.
//!
//! A query string selects entries of a target type (or the contents of a
//! named tag) by field predicates:
//!
//! ```text
//! book: 3 <= rating <= 5 ; author -> "A.B. Cee", "B.C. Dea"
//! ```
//!
//! The parser produces a [`Query`] AST once; [`matches`] runs it against
//! each candidate record during a store scan.

mod eval;
mod lexer;
mod op;
mod parse;
mod statement;

pub use eval::matches;
pub use op::{Cmp, Op};
pub use parse::{Condition, Operand, Query};
