//! The run orchestrator: drives one curation run across a search plan,
//! enforcing quota, halt conditions, and the per-candidate pipeline
//! (filter → classify → registry resolve → admission gate → store).
//!
//! Exactly one run may be active per process. Quota reservation and all
//! counter mutation happen on the orchestrator's sequential path; only the
//! classifier calls within one query's result set fan out.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use studyreel_common::{
    AdmitDestination, Candidate, Config, CuratorError, EntryStatus, HaltReason, LibraryEntry,
    ProgressCounts, ProgressEvent, ProviderError, RejectReason, RunRecord, SearchQuery,
};

use crate::admission::{AdmissionDecision, AdmissionPolicy};
use crate::classifier::ClassifierVerdict;
use crate::filter::{EligibilityFilter, FilterDecision};
use crate::plan::SearchPlan;
use crate::quota::{QuotaTracker, Reservation};
use crate::registry::{InstructorRegistry, Resolution};
use crate::run_log::{EventKind, RunLog};
use crate::traits::{CandidateClassifier, InsertOutcome, LibraryStore, VideoSearcher};

/// Concurrent classifier calls per query batch. Each call is independent
/// and idempotent; counters stay on the sequential path.
const CLASSIFY_CONCURRENCY: usize = 4;

// ---------------------------------------------------------------------------
// Settings / outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RunSettings {
    pub curation_enabled: bool,
    pub max_results_per_query: u32,
    pub max_consecutive_provider_errors: u32,
    /// Unconditional pause between queries to stay under provider rate
    /// limits. Not charged against quota.
    pub inter_query_delay: Duration,
}

impl From<&Config> for RunSettings {
    fn from(config: &Config) -> Self {
        Self {
            curation_enabled: config.curation_enabled,
            max_results_per_query: config.max_results_per_query,
            max_consecutive_provider_errors: config.max_consecutive_provider_errors,
            inter_query_delay: Duration::from_millis(config.inter_query_delay_ms),
        }
    }
}

/// Terminal state of a run. `Failed` is the error return of [`Curator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Completed,
    Halted(HaltReason),
}

pub struct RunOutcome {
    pub state: RunState,
    pub record: RunRecord,
    pub log_path: PathBuf,
}

/// Cancels the owning run between queries. In-flight work for the current
/// query finishes first.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Run stats
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RunStats {
    pub searches_performed: u32,
    pub candidates_scanned: u32,
    pub admitted: u32,
    pub auto_published: u32,
    pub queued_for_review: u32,
    pub rejected: BTreeMap<RejectReason, u32>,
    pub provider_errors: u32,
    pub classifier_failures: u32,
    pub instructors_discovered: u32,
    pub quota_units_used: u32,
}

impl RunStats {
    fn reject(&mut self, reason: RejectReason) {
        *self.rejected.entry(reason).or_insert(0) += 1;
    }

    fn counts(&self) -> ProgressCounts {
        ProgressCounts {
            searches_performed: self.searches_performed,
            candidates_scanned: self.candidates_scanned,
            admitted: self.admitted,
            quota_units_used: self.quota_units_used,
        }
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Curation Run Complete ===")?;
        writeln!(f, "Searches performed:  {}", self.searches_performed)?;
        writeln!(f, "Candidates scanned:  {}", self.candidates_scanned)?;
        writeln!(
            f,
            "Admitted:            {} (auto-published {}, review queue {})",
            self.admitted, self.auto_published, self.queued_for_review
        )?;
        writeln!(f, "Rejected:")?;
        for (reason, count) in &self.rejected {
            writeln!(f, "  {reason}: {count}")?;
        }
        writeln!(f, "Provider errors:     {}", self.provider_errors)?;
        writeln!(f, "Classifier failures: {}", self.classifier_failures)?;
        writeln!(f, "Instructors found:   {}", self.instructors_discovered)?;
        writeln!(f, "Quota units used:    {}", self.quota_units_used)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Curator
// ---------------------------------------------------------------------------

enum QueryFlow {
    Proceed,
    ProviderFailure,
    Halt(HaltReason),
}

pub struct Curator {
    searcher: Arc<dyn VideoSearcher>,
    classifier: Arc<dyn CandidateClassifier>,
    library: Arc<dyn LibraryStore>,
    registry: InstructorRegistry,
    quota: QuotaTracker,
    filter: EligibilityFilter,
    policy: AdmissionPolicy,
    settings: RunSettings,
    running: AtomicBool,
    cancelled: Arc<AtomicBool>,
    progress: Option<mpsc::Sender<ProgressEvent>>,
}

impl Curator {
    pub fn new(
        searcher: Arc<dyn VideoSearcher>,
        classifier: Arc<dyn CandidateClassifier>,
        library: Arc<dyn LibraryStore>,
        registry: InstructorRegistry,
        quota: QuotaTracker,
        filter: EligibilityFilter,
        policy: AdmissionPolicy,
        settings: RunSettings,
    ) -> Self {
        Self {
            searcher,
            classifier,
            library,
            registry,
            quota,
            filter,
            policy,
            settings,
            running: AtomicBool::new(false),
            cancelled: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Subscribe to run progress. Delivery uses `try_send`; a full channel
    /// drops the event rather than stalling the run.
    pub fn with_progress(mut self, sender: mpsc::Sender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancelled.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Execute one run. Fails fast with `AlreadyRunning` when a run is
    /// active — invocations never queue, because a queued run would
    /// double-spend the shared quota budget.
    pub async fn run(&self, plan: SearchPlan) -> Result<RunOutcome, CuratorError> {
        if !self.settings.curation_enabled {
            return Err(CuratorError::CurationDisabled);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CuratorError::AlreadyRunning);
        }

        let result = self.run_inner(plan).await;

        // The cancel flag applies to the run it interrupted, not the next one.
        self.cancelled.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, plan: SearchPlan) -> Result<RunOutcome, CuratorError> {
        let run_id = format!("run-{}", Uuid::new_v4());
        let started_at = Utc::now();
        let mut log = RunLog::new(run_id.clone(), started_at);
        let mut stats = RunStats::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut consecutive_errors = 0u32;
        let mut halt: Option<HaltReason> = None;

        info!(
            run_id = run_id.as_str(),
            strategy = plan.strategy,
            queries = plan.queries.len(),
            quota_remaining = self.quota.remaining(),
            "Curation run starting"
        );

        for (index, query) in plan.queries.iter().enumerate() {
            // Cancellation is checked only between queries; in-flight,
            // already-charged work for the previous query has finished.
            if self.cancelled.load(Ordering::SeqCst) {
                halt = Some(HaltReason::Cancelled);
                break;
            }
            if index > 0 {
                tokio::time::sleep(self.settings.inter_query_delay).await;
            }

            match self
                .run_query(query, &mut log, &mut stats, &mut seen)
                .await?
            {
                QueryFlow::Proceed => consecutive_errors = 0,
                QueryFlow::ProviderFailure => {
                    consecutive_errors += 1;
                    if consecutive_errors >= self.settings.max_consecutive_provider_errors {
                        warn!(consecutive_errors, "Too many consecutive provider errors");
                        halt = Some(HaltReason::ProviderErrors);
                        break;
                    }
                }
                QueryFlow::Halt(reason) => {
                    halt = Some(reason);
                    break;
                }
            }
        }

        if let Some(reason) = halt {
            log.log(EventKind::RunHalted { reason });
        }
        log.log(EventKind::QuotaCheckpoint {
            units_used: self.quota.units_used(),
            remaining: self.quota.remaining(),
        });

        let record = RunRecord {
            run_id,
            started_at,
            completed_at: Utc::now(),
            searches_performed: stats.searches_performed,
            candidates_scanned: stats.candidates_scanned,
            admitted: stats.admitted,
            rejected_reasons: stats.rejected.clone(),
            provider_errors: stats.provider_errors,
            classifier_failures: stats.classifier_failures,
            quota_units_used: stats.quota_units_used,
            halt_reason: halt,
        };
        let log_path = log.save(&record)?;

        info!("{stats}");

        let state = match halt {
            Some(reason) => RunState::Halted(reason),
            None => RunState::Completed,
        };
        Ok(RunOutcome {
            state,
            record,
            log_path,
        })
    }

    async fn run_query(
        &self,
        query: &SearchQuery,
        log: &mut RunLog,
        stats: &mut RunStats,
        seen: &mut HashSet<String>,
    ) -> Result<QueryFlow, CuratorError> {
        let now = Utc::now();

        // Reserve before spending — a denied reservation halts the run
        // before any provider call executes.
        let search_units = self.searcher.search_cost();
        if self.quota.reserve(search_units, now)? == Reservation::Denied {
            warn!(
                query = query.text.as_str(),
                needed = search_units,
                remaining = self.quota.remaining(),
                "Search quota exhausted"
            );
            return Ok(QueryFlow::Halt(HaltReason::QuotaExhausted));
        }

        let candidates = match self
            .searcher
            .search(&query.text, self.settings.max_results_per_query)
            .await
        {
            Ok(candidates) => {
                self.quota.consume(search_units, now)?;
                stats.quota_units_used += search_units;
                stats.searches_performed += 1;
                candidates
            }
            Err(ProviderError::QuotaExceeded) => {
                // The provider's accounting wins over our advisory tracker.
                warn!(query = query.text.as_str(), "Provider reported quota exhausted");
                log.log(EventKind::ProviderSkip {
                    scope: "query".to_string(),
                    detail: "provider reported quota exhausted".to_string(),
                });
                return Ok(QueryFlow::Halt(HaltReason::QuotaExhausted));
            }
            Err(e) => {
                warn!(query = query.text.as_str(), error = %e, "Search failed");
                stats.provider_errors += 1;
                log.log(EventKind::ProviderSkip {
                    scope: "query".to_string(),
                    detail: e.to_string(),
                });
                return Ok(QueryFlow::ProviderFailure);
            }
        };

        let result_count = candidates.len() as u32;
        log.log(EventKind::SearchQuery {
            query: query.text.clone(),
            result_count,
            units_charged: search_units,
        });

        // Duplicate check first — it is the cheapest and keeps duplicates
        // from spending metadata-fetch quota.
        let mut fresh: Vec<Candidate> = Vec::new();
        let mut batch_ids: HashSet<String> = HashSet::new();
        for candidate in candidates {
            stats.candidates_scanned += 1;
            let duplicate = batch_ids.contains(&candidate.external_id)
                || self
                    .filter
                    .is_duplicate(&candidate, seen, self.library.as_ref())
                    .await?;
            if duplicate {
                stats.reject(RejectReason::Duplicate);
                log.log(EventKind::CandidateRejected {
                    external_id: candidate.external_id.clone(),
                    reason: RejectReason::Duplicate,
                    reasoning: "already in library, review queue, or this run".to_string(),
                });
                continue;
            }
            batch_ids.insert(candidate.external_id.clone());
            fresh.push(candidate);
        }
        if fresh.is_empty() {
            self.push_progress(ProgressEvent::QueryCompleted {
                query: query.text.clone(),
                results: result_count,
                counts: stats.counts(),
            });
            return Ok(QueryFlow::Proceed);
        }

        // Secondary metadata fetch: one batched, quota-bearing call.
        let details_units = self.searcher.details_cost();
        if self.quota.reserve(details_units, now)? == Reservation::Denied {
            return Ok(QueryFlow::Halt(HaltReason::QuotaExhausted));
        }
        let ids: Vec<String> = fresh.iter().map(|c| c.external_id.clone()).collect();
        let durations = match self.searcher.fetch_durations(&ids).await {
            Ok(durations) => {
                self.quota.consume(details_units, now)?;
                stats.quota_units_used += details_units;
                durations
            }
            Err(ProviderError::QuotaExceeded) => {
                return Ok(QueryFlow::Halt(HaltReason::QuotaExhausted));
            }
            Err(e) => {
                // A failed fetch is a provider error for every candidate in
                // the batch — never TooShort.
                warn!(query = query.text.as_str(), error = %e, "Metadata fetch failed");
                stats.provider_errors += fresh.len() as u32;
                log.log(EventKind::ProviderSkip {
                    scope: "metadata".to_string(),
                    detail: e.to_string(),
                });
                return Ok(QueryFlow::ProviderFailure);
            }
        };

        // Remaining filter checks on the hydrated batch.
        let mut to_classify: Vec<Candidate> = Vec::new();
        for mut candidate in fresh {
            match durations.get(&candidate.external_id) {
                Some(secs) => candidate.duration_seconds = Some(*secs),
                None => {
                    debug!(
                        external_id = candidate.external_id.as_str(),
                        "No metadata returned for candidate, skipping"
                    );
                    stats.provider_errors += 1;
                    log.log(EventKind::ProviderSkip {
                        scope: "candidate".to_string(),
                        detail: format!("{}: no metadata returned", candidate.external_id),
                    });
                    continue;
                }
            }

            match self
                .filter
                .admit(&candidate, seen, self.library.as_ref())
                .await?
            {
                FilterDecision::Pass => to_classify.push(candidate),
                FilterDecision::Reject(reason) => {
                    stats.reject(reason);
                    log.log(EventKind::CandidateRejected {
                        external_id: candidate.external_id.clone(),
                        reason,
                        reasoning: filter_reasoning(reason, &candidate),
                    });
                    seen.insert(candidate.external_id);
                }
            }
        }

        // Classifier calls fan out within the batch; each is independent
        // and idempotent. Everything after collection is single-writer.
        let classifier = &self.classifier;
        let verdicts: Vec<(Candidate, ClassifierVerdict)> =
            stream::iter(to_classify.into_iter().map(|candidate| async move {
                let verdict = classifier.classify(&candidate).await;
                (candidate, verdict)
            }))
            .buffer_unordered(CLASSIFY_CONCURRENCY)
            .collect()
            .await;

        for (candidate, verdict) in verdicts {
            seen.insert(candidate.external_id.clone());
            self.settle_candidate(candidate, verdict, log, stats).await?;
        }

        self.push_progress(ProgressEvent::QueryCompleted {
            query: query.text.clone(),
            results: result_count,
            counts: stats.counts(),
        });

        Ok(QueryFlow::Proceed)
    }

    /// Registry resolution and the admission gate for one classified
    /// candidate. Runs on the sequential path.
    async fn settle_candidate(
        &self,
        candidate: Candidate,
        verdict: ClassifierVerdict,
        log: &mut RunLog,
        stats: &mut RunStats,
    ) -> Result<(), CuratorError> {
        if verdict.failed {
            stats.classifier_failures += 1;
        }

        // Any instructor name out of the classifier is provisional until
        // the registry corroborates it.
        let mut instructor_ref = None;
        let mut instructor_name = verdict.analysis.instructor_name.clone();
        if verdict.analysis.is_instructional {
            if let Some(name) = &verdict.analysis.instructor_name {
                match self
                    .registry
                    .resolve(
                        name,
                        &verdict.analysis.reasoning,
                        verdict.analysis.quality_score,
                        Utc::now(),
                    )
                    .await?
                {
                    Resolution::Linked(instructor) => {
                        instructor_ref = Some(instructor.id);
                        instructor_name = Some(instructor.name);
                    }
                    Resolution::Discovered(instructor) => {
                        stats.instructors_discovered += 1;
                        log.log(EventKind::InstructorDiscovered {
                            name: instructor.name.clone(),
                            tier: instructor.tier,
                        });
                        instructor_ref = Some(instructor.id);
                    }
                    Resolution::Unlinked => {}
                }
            }
        }

        let (decision, reasoning) = self.policy.decide(&verdict);
        match decision {
            AdmissionDecision::Admit(destination) => {
                let entry = LibraryEntry {
                    external_id: candidate.external_id.clone(),
                    title: candidate.title.clone(),
                    instructor_ref,
                    instructor_name,
                    technique: verdict.analysis.technique.clone(),
                    quality_score: verdict.analysis.quality_score,
                    status: match destination {
                        AdmitDestination::AutoPublish => EntryStatus::Active,
                        AdmitDestination::ReviewQueue => EntryStatus::PendingReview,
                    },
                    admitted_at: Utc::now(),
                };

                let outcome = match destination {
                    AdmitDestination::AutoPublish => self.library.insert(&entry).await?,
                    AdmitDestination::ReviewQueue => {
                        self.library.insert_to_review_queue(&entry).await?
                    }
                };

                match outcome {
                    InsertOutcome::Inserted => {
                        if destination == AdmitDestination::AutoPublish {
                            self.library
                                .enqueue_knowledge_extraction(&entry.external_id)
                                .await?;
                        }
                        stats.admitted += 1;
                        match destination {
                            AdmitDestination::AutoPublish => stats.auto_published += 1,
                            AdmitDestination::ReviewQueue => stats.queued_for_review += 1,
                        }
                        info!(
                            external_id = entry.external_id.as_str(),
                            destination = %destination,
                            quality_score = entry.quality_score,
                            "Candidate admitted"
                        );
                        log.log(EventKind::CandidateAdmitted {
                            external_id: entry.external_id.clone(),
                            title: entry.title.clone(),
                            destination,
                            quality_score: entry.quality_score,
                            reasoning,
                        });
                        self.push_progress(ProgressEvent::CandidateAdmitted {
                            external_id: entry.external_id,
                            title: entry.title,
                            destination,
                            quality_score: entry.quality_score,
                            counts: stats.counts(),
                        });
                    }
                    InsertOutcome::DuplicateIgnored => {
                        // Persistence conflict on external_id — swallowed
                        // as a duplicate, the store's uniqueness wins.
                        stats.reject(RejectReason::Duplicate);
                        log.log(EventKind::CandidateRejected {
                            external_id: candidate.external_id,
                            reason: RejectReason::Duplicate,
                            reasoning: "external id already present at insert".to_string(),
                        });
                    }
                }
            }
            AdmissionDecision::Reject(reason) => {
                stats.reject(reason);
                log.log(EventKind::CandidateRejected {
                    external_id: candidate.external_id,
                    reason,
                    reasoning,
                });
            }
        }

        Ok(())
    }

    fn push_progress(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            if sender.try_send(event).is_err() {
                debug!("Progress subscriber behind, dropping event");
            }
        }
    }
}

fn filter_reasoning(reason: RejectReason, candidate: &Candidate) -> String {
    match reason {
        RejectReason::TooShort => format!(
            "duration {}s below minimum",
            candidate.duration_seconds.unwrap_or(0)
        ),
        RejectReason::LanguageMismatch => "metadata language outside the allowed set".to_string(),
        _ => "filtered before classification".to_string(),
    }
}
