// Trait abstractions for the orchestrator's collaborators.
//
// VideoSearcher — the external search provider, behind one seam so the run
//   loop never touches reqwest directly.
// CandidateClassifier — the AI classification stage(s).
// LibraryStore — the durable content repository; externalId uniqueness is
//   the source of truth for at-most-once admission.
// RegistryStore / QuotaStore — persistence for the instructor registry and
//   the daily quota counter.
//
// These enable deterministic testing with MockSearcher and MockClassifier:
// no network, no API keys, no quota spend.

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;

use studyreel_common::{Candidate, Instructor, LibraryEntry, ProviderError, QuotaState};

use crate::classifier::ClassifierVerdict;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

// ---------------------------------------------------------------------------
// VideoSearcher
// ---------------------------------------------------------------------------

#[async_trait]
pub trait VideoSearcher: Send + Sync {
    /// Run one provider query. An empty result list is a valid outcome,
    /// distinct from any error.
    async fn search(&self, query: &str, max_results: u32) -> ProviderResult<Vec<Candidate>>;

    /// Batched secondary metadata fetch. One quota charge per call; ids the
    /// provider does not return are absent from the map.
    async fn fetch_durations(&self, ids: &[String]) -> ProviderResult<HashMap<String, u32>>;

    /// Advisory per-call unit cost of `search`, as reported by the provider.
    fn search_cost(&self) -> u32;

    /// Advisory per-call unit cost of `fetch_durations`.
    fn details_cost(&self) -> u32;
}

// ---------------------------------------------------------------------------
// CandidateClassifier
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CandidateClassifier: Send + Sync {
    /// Classify one candidate from text metadata. Never fails for content
    /// reasons: transport/schema/timeout problems come back as a fail-closed
    /// verdict with `failed` set.
    async fn classify(&self, candidate: &Candidate) -> ClassifierVerdict;
}

// ---------------------------------------------------------------------------
// LibraryStore
// ---------------------------------------------------------------------------

/// Result of an insert attempt. A duplicate `external_id` is swallowed, not
/// an error — idempotent re-admission is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateIgnored,
}

#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// True when the id exists anywhere in the library or the review queue.
    async fn exists(&self, external_id: &str) -> Result<bool>;

    async fn insert(&self, entry: &LibraryEntry) -> Result<InsertOutcome>;

    async fn insert_to_review_queue(&self, entry: &LibraryEntry) -> Result<InsertOutcome>;

    /// Hand an auto-published entry to the downstream knowledge-extraction
    /// stage. Called exactly on the auto-publish path.
    async fn enqueue_knowledge_extraction(&self, external_id: &str) -> Result<()>;

    /// Entry counts per technique, for gap-targeted planning.
    async fn technique_counts(&self) -> Result<HashMap<String, u32>>;
}

// ---------------------------------------------------------------------------
// RegistryStore
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Exact, case-insensitive match over canonical names and aliases.
    async fn find_by_name(&self, name: &str) -> Result<Option<Instructor>>;

    async fn insert(&self, instructor: &Instructor) -> Result<()>;

    async fn update(&self, instructor: &Instructor) -> Result<()>;

    async fn list(&self) -> Result<Vec<Instructor>>;
}

// ---------------------------------------------------------------------------
// QuotaStore
// ---------------------------------------------------------------------------

pub trait QuotaStore: Send + Sync {
    fn load(&self) -> Result<Option<QuotaState>>;

    fn save(&self, state: &QuotaState) -> Result<()>;
}
