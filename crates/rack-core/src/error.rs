use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RackError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("field error: {0}")]
    Field(String),

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key mismatch: '{key}' does not address an entry with canonical key '{canonical}'")]
    KeyMismatch { key: String, canonical: String },

    #[error("query parse error at byte {offset}: expected {expected}, found {found}")]
    QueryParse {
        offset: usize,
        expected: String,
        found: String,
    },

    #[error("query type error: {0}")]
    QueryType(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage engine error: {0}")]
    Engine(String),

    #[error("backup error: {0}")]
    Backup(String),

    #[error("restore error: {0}")]
    Restore(String),

    #[error("other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RackError>;

impl RackError {
    /// Wrap this error with additional context.
    ///
    /// The context string is prepended to the error message, producing a
    /// chain like `"while restoring snapshot: key not found: book_3"`.
    pub fn context(self, msg: impl Into<String>) -> Self {
        let ctx = msg.into();
        RackError::Other(anyhow::Error::msg(format!("{}: {}", ctx, self)))
    }
}

/// Extension trait to add `.context()` on `Result<T, RackError>`.
pub trait ResultExt<T> {
    /// If the result is `Err`, wrap the error with additional context.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// If the result is `Err`, wrap the error with a lazily-evaluated context.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
