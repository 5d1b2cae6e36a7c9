//! Admission, registry-resolution, and audit-trail scenarios. Mock provider
//! + mock classifier + in-memory stores; the run log lands in a tempdir.
//!
//! Run with: cargo test -p studyreel-curator --test admission_scenarios_test

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use studyreel_common::RejectReason;
use studyreel_curator::admission::AdmissionPolicy;
use studyreel_curator::classifier::QcReview;
use studyreel_curator::filter::EligibilityFilter;
use studyreel_curator::orchestrator::{Curator, RunSettings, RunState};
use studyreel_curator::plan::SearchPlan;
use studyreel_curator::quota::QuotaTracker;
use studyreel_curator::registry::InstructorRegistry;
use studyreel_curator::run_log::{EventKind, PersistedRunLog};
use studyreel_curator::store::{MemoryLibrary, MemoryQuotaStore, MemoryRegistryStore};
use studyreel_curator::testing::{
    approving_verdict, candidate, instructor, rejecting_verdict, MockClassifier, MockSearcher,
};
use studyreel_curator::traits::{CandidateClassifier, RegistryStore, VideoSearcher};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_data_dir() {
    static ONCE: std::sync::Once = std::sync::Once::new();
    ONCE.call_once(|| {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("DATA_DIR", dir.path());
        std::mem::forget(dir);
    });
}

fn build_curator(
    library: Arc<MemoryLibrary>,
    registry_store: Arc<MemoryRegistryStore>,
    searcher: Arc<dyn VideoSearcher>,
    classifier: Arc<dyn CandidateClassifier>,
    policy: AdmissionPolicy,
) -> Curator {
    init_data_dir();
    let quota =
        QuotaTracker::open(Box::new(MemoryQuotaStore::default()), 10_000, Utc::now()).unwrap();
    Curator::new(
        searcher,
        classifier,
        library,
        InstructorRegistry::new(registry_store),
        quota,
        EligibilityFilter::new(70, vec!["en".to_string()]),
        policy,
        RunSettings {
            curation_enabled: true,
            max_results_per_query: 10,
            max_consecutive_provider_errors: 3,
            inter_query_delay: Duration::ZERO,
        },
    )
}

fn default_policy() -> AdmissionPolicy {
    AdmissionPolicy {
        quality_threshold: 7.5,
        manual_review_enabled: false,
    }
}

fn plan(queries: &[&str]) -> SearchPlan {
    SearchPlan {
        strategy: "test",
        queries: queries
            .iter()
            .map(|q| studyreel_common::SearchQuery::plain(*q))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Audit trail
// ---------------------------------------------------------------------------

/// Every decision lands in the persisted run log with its reasoning, so the
/// acceptance-rate statistics in the RunRecord can be recomputed from the
/// event timeline alone.
#[tokio::test]
async fn acceptance_statistics_reconstruct_from_the_run_log() {
    let library = Arc::new(MemoryLibrary::new());
    let searcher = MockSearcher::new().with_page(Ok(vec![
        candidate("vid-pass", "Armbar from closed guard full breakdown", 600),
        candidate("vid-short", "Quick armbar tip", 65),
        candidate("vid-junk", "ADCC 2024 finals highlights", 600),
    ]));
    let classifier = MockClassifier::new(approving_verdict(8.2)).with_verdict(
        "vid-junk",
        rejecting_verdict("competition footage, not instruction"),
    );

    let curator = build_curator(
        library,
        Arc::new(MemoryRegistryStore::new()),
        Arc::new(searcher),
        Arc::new(classifier),
        default_policy(),
    );
    let outcome = curator.run(plan(&["armbar"])).await.unwrap();
    assert_eq!(outcome.state, RunState::Completed);

    let saved = PersistedRunLog::load(&outcome.log_path).unwrap();

    let mut rejected: BTreeMap<RejectReason, u32> = BTreeMap::new();
    let mut admitted = 0u32;
    for event in &saved.events {
        match &event.kind {
            EventKind::CandidateRejected { reason, reasoning, .. } => {
                assert!(!reasoning.is_empty(), "every rejection carries reasoning");
                *rejected.entry(*reason).or_insert(0) += 1;
            }
            EventKind::CandidateAdmitted { reasoning, .. } => {
                assert!(!reasoning.is_empty(), "every admission carries reasoning");
                admitted += 1;
            }
            _ => {}
        }
    }

    assert_eq!(rejected, saved.record.rejected_reasons);
    assert_eq!(admitted, saved.record.admitted);
    assert_eq!(saved.record.candidates_scanned, 3);
    assert_eq!(saved.record.admitted, 1);
    assert_eq!(
        saved.record.rejected_reasons.get(&RejectReason::TooShort),
        Some(&1)
    );
    assert_eq!(
        saved.record.rejected_reasons.get(&RejectReason::LowQuality),
        Some(&1)
    );
}

/// An empty result page is a valid outcome, not an error: the run completes
/// and still persists a RunRecord, so "zero admitted" is distinguishable
/// from "run never executed".
#[tokio::test]
async fn empty_results_still_produce_a_complete_run_record() {
    let library = Arc::new(MemoryLibrary::new());
    let searcher = MockSearcher::new().with_page(Ok(vec![]));
    let classifier = MockClassifier::new(approving_verdict(8.0));

    let curator = build_curator(
        library,
        Arc::new(MemoryRegistryStore::new()),
        Arc::new(searcher),
        Arc::new(classifier),
        default_policy(),
    );
    let outcome = curator.run(plan(&["obscure position"])).await.unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.record.searches_performed, 1);
    assert_eq!(outcome.record.admitted, 0);
    assert!(outcome.log_path.exists());
}

/// A QC-stage rejection is final for the run and its reasoning string is
/// preserved in the analysis log.
#[tokio::test]
async fn qc_rejection_reasoning_lands_in_the_run_log() {
    let library = Arc::new(MemoryLibrary::new());
    let searcher = MockSearcher::new().with_page(Ok(vec![candidate(
        "vid1",
        "Armbar from closed guard",
        600,
    )]));
    let mut verdict = approving_verdict(8.5);
    verdict.approved = false;
    verdict.qc = Some(QcReview {
        approved: false,
        reasoning: "title pattern reads like competition footage".to_string(),
    });
    let classifier = MockClassifier::new(verdict);

    let curator = build_curator(
        library.clone(),
        Arc::new(MemoryRegistryStore::new()),
        Arc::new(searcher),
        Arc::new(classifier),
        default_policy(),
    );
    let outcome = curator.run(plan(&["armbar"])).await.unwrap();

    assert!(library.is_empty());
    let saved = PersistedRunLog::load(&outcome.log_path).unwrap();
    let rejection = saved
        .events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::CandidateRejected { reason, reasoning, .. } => Some((*reason, reasoning)),
            _ => None,
        })
        .expect("rejection logged");
    assert_eq!(rejection.0, RejectReason::LowQuality);
    assert!(rejection.1.contains("competition footage"));
}

// ---------------------------------------------------------------------------
// Registry resolution during admission
// ---------------------------------------------------------------------------

/// An operator-added alias re-points later admissions at the canonical
/// entry: no new registry entry is discovered for the alternate spelling.
#[tokio::test]
async fn alias_added_by_admin_links_later_admissions() {
    let registry_store = Arc::new(MemoryRegistryStore::seeded(vec![instructor(
        "Marcelo Garcia",
    )]));
    let registry = InstructorRegistry::new(registry_store.clone());
    let canonical = registry
        .add_alias("Marcelo Garcia", "Marcello Garcia")
        .await
        .unwrap();

    let library = Arc::new(MemoryLibrary::new());
    let searcher = MockSearcher::new().with_page(Ok(vec![candidate(
        "vid1",
        "X guard sweeps every grappler should know",
        900,
    )]));
    let mut verdict = approving_verdict(8.8);
    verdict.analysis.instructor_name = Some("marcello garcia".to_string());
    let classifier = MockClassifier::new(verdict);

    let curator = build_curator(
        library.clone(),
        registry_store.clone(),
        Arc::new(searcher),
        Arc::new(classifier),
        default_policy(),
    );
    curator.run(plan(&["x guard"])).await.unwrap();

    let entry = library.entry("vid1").unwrap();
    assert_eq!(entry.instructor_ref, Some(canonical.id));
    assert_eq!(entry.instructor_name.as_deref(), Some("Marcelo Garcia"));
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

/// A score under the discovery bar but over the admission threshold: the
/// video is admitted, the instructor name stays free text with no registry
/// link, and nothing is created.
#[tokio::test]
async fn below_discovery_bar_instructor_stays_free_text() {
    let registry_store = Arc::new(MemoryRegistryStore::new());
    let library = Arc::new(MemoryLibrary::new());
    let searcher = MockSearcher::new().with_page(Ok(vec![candidate(
        "vid1",
        "Knee slice pass details",
        600,
    )]));
    let mut verdict = approving_verdict(7.2);
    verdict.analysis.instructor_name = Some("Fresh Face".to_string());
    let classifier = MockClassifier::new(verdict);

    let curator = build_curator(
        library.clone(),
        registry_store.clone(),
        Arc::new(searcher),
        Arc::new(classifier),
        AdmissionPolicy {
            quality_threshold: 7.0,
            manual_review_enabled: false,
        },
    );
    let outcome = curator.run(plan(&["knee slice"])).await.unwrap();

    assert_eq!(outcome.record.admitted, 1);
    let entry = library.entry("vid1").unwrap();
    assert_eq!(entry.instructor_ref, None);
    assert_eq!(entry.instructor_name.as_deref(), Some("Fresh Face"));
    assert!(registry_store.list().await.unwrap().is_empty());
}

/// A name attached to a non-instructional verdict is never corroborated:
/// the registry stays untouched.
#[tokio::test]
async fn non_instructional_names_never_reach_the_registry() {
    let registry_store = Arc::new(MemoryRegistryStore::new());
    let library = Arc::new(MemoryLibrary::new());
    let searcher = MockSearcher::new().with_page(Ok(vec![candidate(
        "vid1",
        "Gordon Ryan seminar announcement",
        600,
    )]));
    let mut verdict = rejecting_verdict("event promo, not instruction");
    verdict.analysis.instructor_name = Some("Gordon Ryan".to_string());
    let classifier = MockClassifier::new(verdict);

    let curator = build_curator(
        library,
        registry_store.clone(),
        Arc::new(searcher),
        Arc::new(classifier),
        default_policy(),
    );
    curator.run(plan(&["gordon ryan"])).await.unwrap();

    assert!(registry_store.list().await.unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Language gate
// ---------------------------------------------------------------------------

/// Metadata outside the allowed language set is rejected before the
/// classifier ever runs.
#[tokio::test]
async fn language_mismatch_is_rejected_before_classification() {
    let library = Arc::new(MemoryLibrary::new());
    let mut foreign = candidate("vid1", "腕ひしぎ十字固めの基本", 600);
    foreign.description = "クローズドガードからの腕十字の詳細な解説".to_string();
    foreign.source_channel = "柔術チャンネル".to_string();
    let searcher = MockSearcher::new().with_page(Ok(vec![foreign]));
    let classifier = Arc::new(MockClassifier::new(approving_verdict(8.0)));

    let curator = build_curator(
        library,
        Arc::new(MemoryRegistryStore::new()),
        Arc::new(searcher),
        classifier.clone(),
        default_policy(),
    );
    let outcome = curator.run(plan(&["armbar"])).await.unwrap();

    assert_eq!(classifier.total_calls(), 0);
    assert_eq!(
        outcome
            .record
            .rejected_reasons
            .get(&RejectReason::LanguageMismatch),
        Some(&1)
    );
}
