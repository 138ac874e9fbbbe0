//! The episodic store contract and its two strategies.
//!
//! - [`ScanStore`] keeps embeddings as flat byte blobs and ranks every
//!   candidate in process with [`crate::similarity::rank`].
//! - [`VecIndexStore`] mirrors embeddings into a `sqlite-vec` `vec0` table
//!   and lets SQLite answer nearest-neighbour queries.
//!
//! Callers pick one at construction through [`open_store`] and only ever see
//! `dyn ExperienceStore` afterwards.

pub mod scan;
pub(crate) mod sqlite;
pub mod vec_index;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use hunter_types::Experience;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::MemoryError;
use crate::rules::NewRule;

pub use scan::ScanStore;
pub use vec_index::VecIndexStore;

/// Persistence of rules and experiences.
///
/// Every method that touches the database takes a cancellation token and
/// returns [`MemoryError::Cancelled`] promptly once it fires. Implementations
/// are safe to share across tasks.
#[async_trait]
pub trait ExperienceStore: Send + Sync {
    /// Active rule texts, highest priority first.
    async fn active_rules(&self, cancel: &CancellationToken) -> Result<Vec<String>, MemoryError>;

    /// The `limit` experiences most similar to `query`, best first, with
    /// `similarity` populated. Records without an embedding never appear.
    async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Experience>, MemoryError>;

    /// Append one experience. Either the row is committed or nothing is.
    async fn save(
        &self,
        pattern: &str,
        cause: &str,
        solution: &str,
        vector: Option<&[f32]>,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryError>;

    /// Seed the rule table if it is empty. Administrative; not part of the
    /// read path.
    async fn seed_rules(&self, rules: &[NewRule], cancel: &CancellationToken) -> Result<usize, MemoryError>;

    fn backend(&self) -> Backend;

    /// Release the connection. Subsequent calls fail with [`MemoryError::Closed`].
    fn close(&self);
}

/// Which ranking strategy backs the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Brute-force cosine ranking over decoded blobs.
    #[default]
    Scan,
    /// `sqlite-vec` native nearest-neighbour index.
    VecIndex,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Scan => "scan",
            Backend::VecIndex => "vec-index",
        })
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" | "brute-force" => Ok(Backend::Scan),
            "vec-index" | "vec" | "sqlite-vec" => Ok(Backend::VecIndex),
            other => Err(format!("unknown backend '{other}' (expected 'scan' or 'vec-index')")),
        }
    }
}

/// Construction parameters for [`open_store`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: Backend,
    /// SQLite file path, or `":memory:"`.
    pub path: String,
    /// Embedding dimension of the native index. Ignored by [`Backend::Scan`].
    pub dimension: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: Backend::Scan, path: ":memory:".to_string(), dimension: 768 }
    }
}

/// Open the store selected by `config`. Connection and schema failures are
/// returned immediately.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn ExperienceStore>, MemoryError> {
    let store: Arc<dyn ExperienceStore> = match config.backend {
        Backend::Scan => Arc::new(ScanStore::open(&config.path)?),
        Backend::VecIndex => Arc::new(VecIndexStore::open(&config.path, config.dimension)?),
    };
    info!(backend = %config.backend, path = %config.path, "experience store opened");
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_and_displays() {
        assert_eq!("scan".parse::<Backend>().unwrap(), Backend::Scan);
        assert_eq!(" Vec-Index ".parse::<Backend>().unwrap(), Backend::VecIndex);
        assert!("postgres".parse::<Backend>().is_err());
        assert_eq!(Backend::VecIndex.to_string(), "vec-index");
    }

    #[test]
    fn backend_serde_is_kebab_case() {
        let json = serde_json::to_string(&Backend::VecIndex).unwrap();
        assert_eq!(json, "\"vec-index\"");
        let back: Backend = serde_json::from_str("\"scan\"").unwrap();
        assert_eq!(back, Backend::Scan);
    }

    #[tokio::test]
    async fn open_store_selects_strategy() {
        let scan = open_store(&StoreConfig::default()).unwrap();
        assert_eq!(scan.backend(), Backend::Scan);

        let vec = open_store(&StoreConfig { backend: Backend::VecIndex, dimension: 4, ..Default::default() }).unwrap();
        assert_eq!(vec.backend(), Backend::VecIndex);
        vec.close();
    }
}
