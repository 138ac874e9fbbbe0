use thiserror::Error;

use crate::codec::CodecError;
use crate::embedder::EmbedError;

/// Errors that can arise from memory store and service operations.
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Corrupt embedding: {0}")]
    Codec(#[from] CodecError),
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),
    #[error("Experience has no pattern, cause or solution")]
    EmptyExperience,
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Store is closed")]
    Closed,
    #[error("Blocking worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("Connection lock poisoned")]
    Poisoned,
}

impl MemoryError {
    /// Map an embedder failure, keeping cancellation distinct.
    pub(crate) fn from_embed(e: EmbedError) -> Self {
        match e {
            EmbedError::Cancelled => MemoryError::Cancelled,
            other => MemoryError::Embedding(other),
        }
    }
}
