//! [`MemoryService`] – the facade callers use instead of talking to the
//! store and embedder separately.
//!
//! It owns the text-level operations: searching by free text, recording an
//! explicit experience, ingesting a finished conversation and assembling
//! the rules + relevant experiences context for a prompt.

use std::sync::Arc;

use hunter_types::{Experience, MemoryEntry, Turn};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::embedder::Embedder;
use crate::error::MemoryError;
use crate::ingest::{IngestOutcome, IngestPolicy, SkipReason};
use crate::store::ExperienceStore;

/// Default top-K for text search.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Author attached to entries produced from episodic memory.
pub const MEMORY_AUTHOR: &str = "system";

/// Rules and experiences gathered for one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    pub rules: Vec<String>,
    pub relevant: Vec<Experience>,
}

/// Render an experience as `Problem:` / `Cause:` / `Solution:` lines,
/// omitting empty fields. Returns `None` for a blank record.
pub fn render_experience(experience: &Experience) -> Option<String> {
    if experience.is_blank() {
        return None;
    }
    let lines: Vec<String> = [
        ("Problem", &experience.error_pattern),
        ("Cause", &experience.root_cause),
        ("Solution", &experience.solution_summary),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(label, value)| format!("{label}: {value}"))
    .collect();
    Some(lines.join("\n"))
}

/// Text-level access to project memory.
pub struct MemoryService {
    store: Arc<dyn ExperienceStore>,
    embedder: Option<Arc<dyn Embedder>>,
    search_limit: usize,
    policy: IngestPolicy,
}

impl MemoryService {
    /// A service with no embedder: searches return nothing and ingestion is
    /// skipped until one is attached with [`MemoryService::with_embedder`].
    pub fn new(store: Arc<dyn ExperienceStore>) -> Self {
        Self { store, embedder: None, search_limit: DEFAULT_SEARCH_LIMIT, policy: IngestPolicy::default() }
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn with_policy(mut self, policy: IngestPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &Arc<dyn ExperienceStore> {
        &self.store
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Active rule texts, highest priority first.
    pub async fn active_rules(&self, cancel: &CancellationToken) -> Result<Vec<String>, MemoryError> {
        self.store.active_rules(cancel).await
    }

    /// Experiences most similar to `text`, best first.
    ///
    /// Empty (or whitespace-only) text and a missing embedder both yield an
    /// empty result rather than an error.
    #[instrument(skip_all, fields(limit = self.search_limit))]
    pub async fn recall(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<Experience>, MemoryError> {
        let Some(embedder) = &self.embedder else {
            debug!("no embedder configured; returning no memories");
            return Ok(Vec::new());
        };
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let vector = embedder.embed(text, cancel).await.map_err(MemoryError::from_embed)?;
        self.store.search_similar(&vector, self.search_limit, cancel).await
    }

    /// [`MemoryService::recall`] rendered as memory entries authored by
    /// `"system"`. Blank records are dropped.
    pub async fn search_memories(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<MemoryEntry>, MemoryError> {
        let experiences = self.recall(text, cancel).await?;
        Ok(experiences
            .iter()
            .filter_map(|e| {
                render_experience(e).map(|content| MemoryEntry {
                    content,
                    author: MEMORY_AUTHOR.to_string(),
                    occurred_at: e.occurred_at,
                })
            })
            .collect())
    }

    /// Record an experience explicitly. All three fields are required; the
    /// embedding is computed from the pattern.
    #[instrument(skip_all)]
    pub async fn remember(
        &self,
        pattern: &str,
        cause: &str,
        solution: &str,
        cancel: &CancellationToken,
    ) -> Result<(), MemoryError> {
        for (name, value) in [("error_pattern", pattern), ("root_cause", cause), ("solution", solution)] {
            if value.trim().is_empty() {
                return Err(MemoryError::MissingField(name));
            }
        }
        let vector = match &self.embedder {
            Some(embedder) => Some(embedder.embed(pattern, cancel).await.map_err(MemoryError::from_embed)?),
            None => {
                warn!("no embedder configured; experience will not be searchable");
                None
            }
        };
        self.store.save(pattern, cause, solution, vector.as_deref(), cancel).await
    }

    /// Run a finished conversation through the ingestion policy.
    pub async fn ingest(&self, turns: &[Turn], cancel: &CancellationToken) -> Result<IngestOutcome, MemoryError> {
        let Some(embedder) = &self.embedder else {
            debug!("no embedder configured; skipping ingestion");
            return Ok(IngestOutcome::Skipped(SkipReason::NoEmbedder));
        };
        self.policy.process(turns, embedder.as_ref(), self.store.as_ref(), cancel).await
    }

    /// Active rules plus the experiences relevant to `query`.
    #[instrument(skip_all)]
    pub async fn context(&self, query: &str, cancel: &CancellationToken) -> Result<MemoryContext, MemoryError> {
        let rules = self.store.active_rules(cancel).await?;
        let relevant = self.recall(query, cancel).await?;
        Ok(MemoryContext { rules, relevant })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::embedder::EmbedError;
    use crate::rules::NewRule;
    use crate::store::Backend;

    /// Embeds text as `[len, 1.0]` and remembers what it was asked.
    #[derive(Default)]
    struct StubEmbedder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, EmbedError> {
            if cancel.is_cancelled() {
                return Err(EmbedError::Cancelled);
            }
            self.seen.lock().unwrap().push(text.to_string());
            Ok(vec![text.chars().count() as f32, 1.0])
        }
    }

    fn experience(pattern: &str, cause: &str, solution: &str) -> Experience {
        Experience {
            id: 1,
            task_signature: pattern.to_string(),
            error_pattern: pattern.to_string(),
            root_cause: cause.to_string(),
            solution_summary: solution.to_string(),
            embedding: None,
            similarity: Some(0.9),
            occurred_at: Utc::now(),
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        queries: Mutex<Vec<(Vec<f32>, usize)>>,
        saved: Mutex<Vec<(String, String, String, Option<Vec<f32>>)>>,
        results: Vec<Experience>,
    }

    #[async_trait]
    impl ExperienceStore for RecordingStore {
        async fn active_rules(&self, _: &CancellationToken) -> Result<Vec<String>, MemoryError> {
            Ok(vec!["Prefer Result over panics".to_string()])
        }
        async fn search_similar(
            &self,
            query: &[f32],
            limit: usize,
            _: &CancellationToken,
        ) -> Result<Vec<Experience>, MemoryError> {
            self.queries.lock().unwrap().push((query.to_vec(), limit));
            Ok(self.results.clone())
        }
        async fn save(
            &self,
            pattern: &str,
            cause: &str,
            solution: &str,
            vector: Option<&[f32]>,
            _: &CancellationToken,
        ) -> Result<(), MemoryError> {
            self.saved.lock().unwrap().push((
                pattern.to_string(),
                cause.to_string(),
                solution.to_string(),
                vector.map(<[f32]>::to_vec),
            ));
            Ok(())
        }
        async fn seed_rules(&self, _: &[NewRule], _: &CancellationToken) -> Result<usize, MemoryError> {
            Ok(0)
        }
        fn backend(&self) -> Backend {
            Backend::Scan
        }
        fn close(&self) {}
    }

    fn token() -> CancellationToken {
        CancellationToken::new()
    }

    #[test]
    fn render_skips_empty_fields() {
        assert_eq!(
            render_experience(&experience("E0382 use of moved value", "", "clone before move")).as_deref(),
            Some("Problem: E0382 use of moved value\nSolution: clone before move")
        );
        assert_eq!(render_experience(&experience("", "", "")), None);
    }

    #[tokio::test]
    async fn search_without_embedder_is_empty() {
        let store = Arc::new(RecordingStore { results: vec![experience("p", "c", "s")], ..Default::default() });
        let service = MemoryService::new(store.clone());
        assert!(service.search_memories("anything", &token()).await.unwrap().is_empty());
        assert!(store.queries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_embeds_text_and_uses_configured_limit() {
        let store = Arc::new(RecordingStore {
            results: vec![experience("p", "c", "s"), experience("", "", "")],
            ..Default::default()
        });
        let service = MemoryService::new(store.clone())
            .with_embedder(Arc::new(StubEmbedder::default()))
            .with_search_limit(3);

        let entries = service.search_memories("borrow error", &token()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].author, "system");
        assert_eq!(entries[0].content, "Problem: p\nCause: c\nSolution: s");
        assert_eq!(store.queries.lock().unwrap().as_slice(), &[(vec![12.0f32, 1.0], 3)]);
    }

    #[tokio::test]
    async fn remember_requires_every_field() {
        let store = Arc::new(RecordingStore::default());
        let service = MemoryService::new(store.clone()).with_embedder(Arc::new(StubEmbedder::default()));
        let err = service.remember("pattern", " ", "solution", &token()).await.unwrap_err();
        assert!(matches!(err, MemoryError::MissingField("root_cause")));
        assert!(store.saved.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remember_embeds_the_pattern() {
        let store = Arc::new(RecordingStore::default());
        let embedder = Arc::new(StubEmbedder::default());
        let service = MemoryService::new(store.clone()).with_embedder(embedder.clone());
        service.remember("linker error", "missing lib", "add -l flag", &token()).await.unwrap();

        assert_eq!(embedder.seen.lock().unwrap().as_slice(), &["linker error".to_string()]);
        let saved = store.saved.lock().unwrap();
        assert_eq!(saved[0].1, "missing lib");
        assert_eq!(saved[0].3.as_deref(), Some(&[12.0f32, 1.0][..]));
    }

    #[tokio::test]
    async fn ingest_without_embedder_is_skipped() {
        let service = MemoryService::new(Arc::new(RecordingStore::default()));
        let turns = vec![Turn::user("q"), Turn::model("a response that is long enough to keep")];
        assert_eq!(
            service.ingest(&turns, &token()).await.unwrap(),
            IngestOutcome::Skipped(SkipReason::NoEmbedder)
        );
    }

    #[tokio::test]
    async fn context_combines_rules_and_experiences() {
        let store = Arc::new(RecordingStore { results: vec![experience("p", "", "s")], ..Default::default() });
        let service = MemoryService::new(store).with_embedder(Arc::new(StubEmbedder::default()));
        let ctx = service.context("p", &token()).await.unwrap();
        assert_eq!(ctx.rules, vec!["Prefer Result over panics"]);
        assert_eq!(ctx.relevant.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_embedding_maps_to_cancelled() {
        let service =
            MemoryService::new(Arc::new(RecordingStore::default())).with_embedder(Arc::new(StubEmbedder::default()));
        let cancel = token();
        cancel.cancel();
        let err = service.recall("q", &cancel).await.unwrap_err();
        assert!(matches!(err, MemoryError::Cancelled));
    }
}
