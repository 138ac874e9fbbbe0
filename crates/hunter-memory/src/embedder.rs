//! The "embed text → vector" capability consumed by search and ingestion.
//!
//! The core never talks to a model server directly; callers inject an
//! [`Embedder`] so tests can substitute a deterministic stand-in.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors reported by an [`Embedder`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// The request to the embedding backend failed.
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The backend answered with something that is not a usable vector.
    #[error("unexpected embedding response: {0}")]
    BadResponse(String),
    #[error("embedding cancelled")]
    Cancelled,
}

/// Converts text into a fixed-dimension vector.
///
/// The dimension must be stable across calls for a given deployment.
/// Implementations do not retry; retry policy belongs to the caller.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, EmbedError>;
}
