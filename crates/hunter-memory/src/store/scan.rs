//! Brute-force strategy: embeddings live as byte blobs in `issue_history`
//! and every search decodes and ranks all of them.

use async_trait::async_trait;
use hunter_types::Experience;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::sqlite::{self, Db, EXPERIENCE_COLUMNS, NewExperience};
use super::{Backend, ExperienceStore};
use crate::error::MemoryError;
use crate::rules::{self, NewRule};
use crate::similarity::rank;

/// SQLite store that ranks candidates in process.
pub struct ScanStore {
    db: Db,
}

impl ScanStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: &str) -> Result<Self, MemoryError> {
        Ok(Self { db: Db::new(sqlite::open_connection(path)?) })
    }

    pub fn open_in_memory() -> Result<Self, MemoryError> {
        Self::open(":memory:")
    }
}

#[async_trait]
impl ExperienceStore for ScanStore {
    #[instrument(skip_all)]
    async fn active_rules(&self, cancel: &CancellationToken) -> Result<Vec<String>, MemoryError> {
        self.db
            .read(cancel, |conn| {
                Ok(rules::load_active_rules(conn)?.into_iter().map(|r| r.rule_content).collect())
            })
            .await
    }

    #[instrument(skip_all, fields(limit = limit, dimension = query.len()))]
    async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Experience>, MemoryError> {
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = self
            .db
            .read(cancel, |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {EXPERIENCE_COLUMNS} FROM issue_history WHERE embedding IS NOT NULL ORDER BY id"
                ))?;
                let rows = stmt.query_map([], sqlite::experience_from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    let (experience, blob) = row?;
                    out.push(sqlite::with_embedding(experience, blob));
                }
                Ok(out)
            })
            .await?;

        let scanned = candidates.len();
        let ranked = rank(query, candidates, limit, |e: &Experience| e.embedding.as_deref().unwrap_or(&[]));
        debug!(scanned, returned = ranked.len(), "brute-force search complete");
        Ok(ranked
            .into_iter()
            .map(|s| Experience { similarity: Some(s.score), ..s.item })
            .collect())
    }

    #[instrument(skip_all, fields(dimension = vector.map_or(0, <[f32]>::len)))]
    async fn save(
        &self,
        pattern: &str,
        cause: &str,
        solution: &str,
        vector: Option<&[f32]>,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryError> {
        let record = NewExperience::prepare(pattern, cause, solution, vector)?;
        let id = self.db.write(cancel, move |tx| record.insert(tx)).await?;
        debug!(id, "experience saved");
        Ok(())
    }

    async fn seed_rules(&self, seed: &[NewRule], cancel: &CancellationToken) -> Result<usize, MemoryError> {
        let seed = seed.to_vec();
        self.db.write(cancel, move |tx| rules::seed_rules(tx, &seed)).await
    }

    fn backend(&self) -> Backend {
        Backend::Scan
    }

    fn close(&self) {
        self.db.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec;

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn save_and_search_ranks_by_similarity() {
        let store = ScanStore::open_in_memory().unwrap();
        let c = token();
        store.save("far", "", "s", Some(&[0.0, 0.0, 1.0]), &c).await.unwrap();
        store.save("exact", "", "s", Some(&[1.0, 0.0, 0.0]), &c).await.unwrap();
        store.save("mid", "", "s", Some(&[1.0, 1.0, 0.0]), &c).await.unwrap();

        let hits = store.search_similar(&[1.0, 0.0, 0.0], 2, &c).await.unwrap();
        let patterns: Vec<_> = hits.iter().map(|e| e.error_pattern.as_str()).collect();
        assert_eq!(patterns, vec!["exact", "mid"]);
        assert!((hits[0].similarity.unwrap() - 1.0).abs() < 1e-6);
        assert_eq!(hits[0].embedding.as_deref(), Some(&[1.0f32, 0.0, 0.0][..]));
    }

    #[tokio::test]
    async fn records_without_embedding_are_never_returned() {
        let store = ScanStore::open_in_memory().unwrap();
        let c = token();
        store.save("no vector", "", "s", None, &c).await.unwrap();
        store.save("empty vector", "", "s", Some(&[]), &c).await.unwrap();
        store.save("with vector", "", "s", Some(&[1.0, 0.0]), &c).await.unwrap();

        let hits = store.search_similar(&[1.0, 0.0], 10, &c).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].error_pattern, "with vector");
    }

    #[tokio::test]
    async fn mismatched_dimensions_are_skipped() {
        let store = ScanStore::open_in_memory().unwrap();
        let c = token();
        store.save("old model", "", "s", Some(&[1.0, 0.0, 0.0, 0.0]), &c).await.unwrap();
        store.save("new model", "", "s", Some(&[0.0, 1.0]), &c).await.unwrap();

        let hits = store.search_similar(&[1.0, 0.0], 10, &c).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].error_pattern, "new model");
    }

    #[tokio::test]
    async fn corrupt_blob_is_skipped_not_fatal() {
        let store = ScanStore::open_in_memory().unwrap();
        let c = token();
        store.save("good", "", "s", Some(&[1.0, 0.0]), &c).await.unwrap();
        store
            .db
            .write(&c, |tx| {
                tx.execute(
                    "INSERT INTO issue_history (task_signature, error_pattern, solution_summary, embedding)
                     VALUES ('bad', 'bad', 's', ?1)",
                    [vec![1u8, 2, 3]],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let hits = store.search_similar(&[1.0, 0.0], 10, &c).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].error_pattern, "good");
    }

    #[tokio::test]
    async fn save_persists_signature_and_blob_layout() {
        let store = ScanStore::open_in_memory().unwrap();
        let c = token();
        let pattern = "錯".repeat(60);
        let vector = vec![0.5f32; 768];
        store.save(&pattern, "cause", "fix", Some(&vector), &c).await.unwrap();

        let (signature, blob): (String, Vec<u8>) = store
            .db
            .read(&c, |conn| {
                Ok(conn.query_row("SELECT task_signature, embedding FROM issue_history", [], |r| {
                    Ok((r.get(0)?, r.get(1)?))
                })?)
            })
            .await
            .unwrap();
        assert_eq!(signature.chars().count(), 50);
        assert_eq!(blob.len(), 3072);
        assert_eq!(codec::decode(&blob).unwrap(), vector);
    }

    #[tokio::test]
    async fn empty_experience_is_rejected() {
        let store = ScanStore::open_in_memory().unwrap();
        let err = store.save("", "", "", Some(&[1.0]), &token()).await.unwrap_err();
        assert!(matches!(err, MemoryError::EmptyExperience));
    }

    #[tokio::test]
    async fn empty_query_or_zero_limit_is_empty() {
        let store = ScanStore::open_in_memory().unwrap();
        let c = token();
        store.save("p", "", "s", Some(&[1.0]), &c).await.unwrap();
        assert!(store.search_similar(&[], 5, &c).await.unwrap().is_empty());
        assert!(store.search_similar(&[1.0], 0, &c).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_save_leaves_no_row() {
        let store = ScanStore::open_in_memory().unwrap();
        let cancelled = token();
        cancelled.cancel();
        let err = store.save("p", "c", "s", Some(&[1.0]), &cancelled).await.unwrap_err();
        assert!(matches!(err, MemoryError::Cancelled));
        assert!(store.search_similar(&[1.0], 5, &token()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rules_are_seeded_and_listed() {
        let store = ScanStore::open_in_memory().unwrap();
        let c = token();
        let seed = vec![
            NewRule { category: "b".into(), content: "low".into(), priority: 1, active: true },
            NewRule { category: "a".into(), content: "high".into(), priority: 2, active: true },
            NewRule { category: "a".into(), content: "off".into(), priority: 9, active: false },
        ];
        assert_eq!(store.seed_rules(&seed, &c).await.unwrap(), 3);
        assert_eq!(store.active_rules(&c).await.unwrap(), vec!["high", "low"]);
    }

    #[tokio::test]
    async fn operations_after_close_fail() {
        let store = ScanStore::open_in_memory().unwrap();
        store.close();
        let err = store.active_rules(&token()).await.unwrap_err();
        assert!(matches!(err, MemoryError::Closed));
    }
}
