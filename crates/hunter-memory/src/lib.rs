//! `hunter-memory` – The Knowledge Base.
//!
//! Gives a coding assistant two tiers of persistent memory on a local SQLite
//! substrate: static project rules (semantic memory) and a growing log of
//! problem/solution records retrievable by embedding similarity (episodic
//! memory).
//!
//! # Modules
//!
//! - [`codec`] – little-endian `f32` blob encoding for stored embeddings.
//! - [`similarity`] – cosine similarity and brute-force top-K ranking.
//! - [`signature`] – code-point-safe truncation for task signatures.
//! - [`rules`] – [`ProjectRule`][hunter_types::ProjectRule] loading with a
//!   total presentation order, plus administrative seeding.
//! - [`store`] – the [`ExperienceStore`][store::ExperienceStore] contract with
//!   a brute-force [`ScanStore`][store::ScanStore] and a `sqlite-vec` backed
//!   [`VecIndexStore`][store::VecIndexStore], chosen via
//!   [`open_store`][store::open_store].
//! - [`embedder`] – the injected text → vector capability.
//! - [`ingest`] – the policy that turns a finished conversation into an
//!   experience.
//! - [`service`] – [`MemoryService`][service::MemoryService], the text-level
//!   facade used by the CLI.

pub mod codec;
pub mod embedder;
pub mod error;
pub mod ingest;
pub mod rules;
pub mod service;
pub mod signature;
pub mod similarity;
pub mod store;

pub use embedder::{EmbedError, Embedder};
pub use error::MemoryError;
pub use ingest::{EXPLICIT_SAVE_ACTION, IngestOutcome, IngestPolicy, SkipReason};
pub use rules::NewRule;
pub use service::{MemoryContext, MemoryService};
pub use store::{Backend, ExperienceStore, StoreConfig, open_store};
