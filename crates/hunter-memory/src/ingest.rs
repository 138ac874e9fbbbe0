//! Automatic ingestion: turning a finished conversation into an experience.
//!
//! The policy looks at one conversation's turns in order and keeps the most
//! recent user text as the query and the most recent non-user text as the
//! response. A conversation in which the assistant already called the
//! explicit save action is never ingested, so the same fix is not recorded
//! twice. Short responses ("ok", "thanks") are filtered out.

use hunter_types::Turn;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::embedder::Embedder;
use crate::error::MemoryError;
use crate::store::ExperienceStore;

/// Function name the assistant uses to save an experience explicitly.
pub const EXPLICIT_SAVE_ACTION: &str = "save_experience";

/// Default minimum response length, in characters.
pub const DEFAULT_MIN_RESPONSE_CHARS: usize = 20;

/// Why a conversation was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The assistant already called [`EXPLICIT_SAVE_ACTION`].
    ExplicitSave,
    MissingQuery,
    MissingResponse,
    /// The response is no longer than the configured threshold.
    TrivialResponse,
    /// No embedder is configured.
    NoEmbedder,
}

/// Result of a single ingestion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Persisted,
    Skipped(SkipReason),
}

/// What the policy decided for a conversation, before any I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Persist { query: String, response: String },
    Skip(SkipReason),
}

/// Text captured while scanning a conversation.
#[derive(Debug, Default)]
struct Scan {
    query: Option<String>,
    response: Option<String>,
    explicit_save: bool,
}

impl Scan {
    fn step(mut self, turn: &Turn) -> Self {
        if turn.calls(EXPLICIT_SAVE_ACTION) {
            self.explicit_save = true;
        }
        if let Some(text) = turn.text() {
            if turn.is_user() {
                self.query = Some(text);
            } else {
                self.response = Some(text);
            }
        }
        self
    }
}

/// Thresholds for automatic ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestPolicy {
    /// A response must be strictly longer than this many characters.
    pub min_response_chars: usize,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self { min_response_chars: DEFAULT_MIN_RESPONSE_CHARS }
    }
}

impl IngestPolicy {
    /// Decide whether `turns` should become an experience.
    pub fn decide(&self, turns: &[Turn]) -> Decision {
        let scan = turns.iter().fold(Scan::default(), Scan::step);
        if scan.explicit_save {
            return Decision::Skip(SkipReason::ExplicitSave);
        }
        let Some(query) = scan.query else {
            return Decision::Skip(SkipReason::MissingQuery);
        };
        let Some(response) = scan.response else {
            return Decision::Skip(SkipReason::MissingResponse);
        };
        if response.chars().count() <= self.min_response_chars {
            return Decision::Skip(SkipReason::TrivialResponse);
        }
        Decision::Persist { query, response }
    }

    /// Apply the policy and, when it says so, embed the query and save the
    /// pair with an empty root cause.
    ///
    /// Embedding and storage failures are returned as-is; nothing is retried.
    #[instrument(skip_all, fields(turns = turns.len()))]
    pub async fn process(
        &self,
        turns: &[Turn],
        embedder: &dyn Embedder,
        store: &dyn ExperienceStore,
        cancel: &CancellationToken,
    ) -> Result<IngestOutcome, MemoryError> {
        let (query, response) = match self.decide(turns) {
            Decision::Persist { query, response } => (query, response),
            Decision::Skip(reason) => {
                debug!(?reason, "conversation not ingested");
                return Ok(IngestOutcome::Skipped(reason));
            }
        };
        let vector = embedder.embed(&query, cancel).await.map_err(MemoryError::from_embed)?;
        store.save(&query, "", &response, Some(&vector), cancel).await?;
        info!(dimension = vector.len(), "conversation ingested as experience");
        Ok(IngestOutcome::Persisted)
    }
}
