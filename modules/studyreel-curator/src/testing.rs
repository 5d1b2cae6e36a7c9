//! Deterministic test doubles and fixture builders. No network, no API
//! keys, no quota spend — the orchestrator suites run on these alone.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use studyreel_common::{
    AnalysisResult, Candidate, DiscoveryMethod, EntryStatus, Instructor, InstructorStatus,
    InstructorTier, LibraryEntry, ProviderError,
};

use crate::classifier::{ClassifierVerdict, QcReview};
use crate::traits::{CandidateClassifier, ProviderResult, VideoSearcher};

// ---------------------------------------------------------------------------
// Fixture builders
// ---------------------------------------------------------------------------

pub fn candidate(external_id: &str, title: &str, duration_seconds: u32) -> Candidate {
    Candidate {
        external_id: external_id.to_string(),
        title: title.to_string(),
        description: String::new(),
        source_channel: "Grapple Lab".to_string(),
        published_at: Utc::now(),
        duration_seconds: Some(duration_seconds),
    }
}

pub fn entry(external_id: &str) -> LibraryEntry {
    entry_with_technique(external_id, "armbar from closed guard")
}

pub fn entry_with_technique(external_id: &str, technique: &str) -> LibraryEntry {
    LibraryEntry {
        external_id: external_id.to_string(),
        title: format!("video {external_id}"),
        instructor_ref: None,
        instructor_name: None,
        technique: Some(technique.to_string()),
        quality_score: 8.0,
        status: EntryStatus::Active,
        admitted_at: Utc::now(),
    }
}

pub fn instructor(name: &str) -> Instructor {
    Instructor {
        id: Uuid::new_v4(),
        name: name.to_string(),
        tier: InstructorTier::Tier2,
        credibility_evidence: "seeded catalog entry".to_string(),
        discovery: DiscoveryMethod::Curated,
        status: InstructorStatus::Approved,
        active: true,
        aliases: Vec::new(),
        created_at: Utc::now(),
    }
}

pub fn approving_verdict(score: f32) -> ClassifierVerdict {
    ClassifierVerdict {
        analysis: AnalysisResult {
            is_instructional: true,
            instructor_name: None,
            technique: Some("armbar from closed guard".to_string()),
            quality_score: score,
            reasoning: "clear step-by-step instruction".to_string(),
        },
        qc: Some(QcReview {
            approved: true,
            reasoning: "verdict holds".to_string(),
        }),
        failed: false,
        approved: true,
    }
}

pub fn rejecting_verdict(reasoning: &str) -> ClassifierVerdict {
    ClassifierVerdict {
        analysis: AnalysisResult {
            is_instructional: false,
            instructor_name: None,
            technique: None,
            quality_score: 2.0,
            reasoning: reasoning.to_string(),
        },
        qc: None,
        failed: false,
        approved: false,
    }
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Scripted search provider. Each `with_page` call queues one `search`
/// response; queued candidates carrying a duration register it for the
/// hydration fetch and are returned unhydrated, the way the real provider
/// behaves.
pub struct MockSearcher {
    pages: Mutex<VecDeque<ProviderResult<Vec<Candidate>>>>,
    durations: Mutex<HashMap<String, u32>>,
    duration_failures: Mutex<VecDeque<ProviderError>>,
    search_count: AtomicU32,
    duration_fetch_count: AtomicU32,
    search_cost: u32,
    details_cost: u32,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            durations: Mutex::new(HashMap::new()),
            duration_failures: Mutex::new(VecDeque::new()),
            search_count: AtomicU32::new(0),
            duration_fetch_count: AtomicU32::new(0),
            search_cost: 100,
            details_cost: 1,
        }
    }

    pub fn with_page(self, page: ProviderResult<Vec<Candidate>>) -> Self {
        if let Ok(candidates) = &page {
            let mut durations = self.durations.lock().unwrap();
            for c in candidates {
                if let Some(secs) = c.duration_seconds {
                    durations.insert(c.external_id.clone(), secs);
                }
            }
        }
        self.pages.lock().unwrap().push_back(page);
        self
    }

    /// Script the next `fetch_durations` call to fail.
    pub fn with_duration_failure(self, err: ProviderError) -> Self {
        self.duration_failures.lock().unwrap().push_back(err);
        self
    }

    /// Drop an id from the metadata fetch, as for a deleted/private video.
    pub fn without_duration(self, external_id: &str) -> Self {
        self.durations.lock().unwrap().remove(external_id);
        self
    }

    pub fn with_costs(mut self, search_cost: u32, details_cost: u32) -> Self {
        self.search_cost = search_cost;
        self.details_cost = details_cost;
        self
    }

    pub fn search_calls(&self) -> u32 {
        self.search_count.load(Ordering::SeqCst)
    }

    pub fn duration_fetches(&self) -> u32 {
        self.duration_fetch_count.load(Ordering::SeqCst)
    }
}

impl Default for MockSearcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VideoSearcher for MockSearcher {
    async fn search(&self, _query: &str, _max_results: u32) -> ProviderResult<Vec<Candidate>> {
        self.search_count.fetch_add(1, Ordering::SeqCst);
        match self.pages.lock().unwrap().pop_front() {
            Some(Ok(candidates)) => Ok(candidates
                .into_iter()
                .map(|mut c| {
                    c.duration_seconds = None;
                    c
                })
                .collect()),
            Some(Err(e)) => Err(e),
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_durations(&self, ids: &[String]) -> ProviderResult<HashMap<String, u32>> {
        self.duration_fetch_count.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.duration_failures.lock().unwrap().pop_front() {
            return Err(err);
        }
        let durations = self.durations.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| durations.get(id).map(|secs| (id.clone(), *secs)))
            .collect())
    }

    fn search_cost(&self) -> u32 {
        self.search_cost
    }

    fn details_cost(&self) -> u32 {
        self.details_cost
    }
}

// ---------------------------------------------------------------------------
// MockClassifier
// ---------------------------------------------------------------------------

/// Scripted classifier with per-candidate call counts, so tests can assert
/// a filtered candidate was never classified.
pub struct MockClassifier {
    default_verdict: ClassifierVerdict,
    verdicts: Mutex<HashMap<String, ClassifierVerdict>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl MockClassifier {
    pub fn new(default_verdict: ClassifierVerdict) -> Self {
        Self {
            default_verdict,
            verdicts: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_verdict(self, external_id: &str, verdict: ClassifierVerdict) -> Self {
        self.verdicts
            .lock()
            .unwrap()
            .insert(external_id.to_string(), verdict);
        self
    }

    pub fn calls_for(&self, external_id: &str) -> u32 {
        self.calls
            .lock()
            .unwrap()
            .get(external_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl CandidateClassifier for MockClassifier {
    async fn classify(&self, candidate: &Candidate) -> ClassifierVerdict {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(candidate.external_id.clone())
            .or_insert(0) += 1;
        self.verdicts
            .lock()
            .unwrap()
            .get(&candidate.external_id)
            .cloned()
            .unwrap_or_else(|| self.default_verdict.clone())
    }
}
