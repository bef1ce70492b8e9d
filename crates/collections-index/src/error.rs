//! Error types for the index engine (§7).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("collection not found: {0}")]
    NotFound(String),

    #[error("package not found: {0}")]
    PackageNotFound(String),

    #[error("stored collection is corrupt: {0}")]
    Corrupt(String),

    #[error("database close failed after retries: {0}")]
    CloseFailed(String),

    #[error("database backend error: {0}")]
    Backend(#[from] rusqlite::Error),

    #[error("collection encoding error: {0}")]
    Encoding(#[from] collections_core::CoreError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("retry attempts exhausted")]
    ExhaustedRetries,

    #[error("a blocking task panicked: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
