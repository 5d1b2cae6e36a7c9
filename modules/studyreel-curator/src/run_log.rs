//! Curation run log — persisted JSON timeline of every decision taken
//! during a run.
//!
//! Each run produces a single `{DATA_DIR}/curator-runs/{run_id}.json` file:
//! the RunRecord summary plus an ordered list of events with timestamps.
//! Acceptance-rate statistics are fully reconstructable from this file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use studyreel_common::{AdmitDestination, HaltReason, InstructorTier, RejectReason, RunRecord};

// ---------------------------------------------------------------------------
// data_dir helper
// ---------------------------------------------------------------------------

/// Root data directory, controlled by `DATA_DIR` env var (default: `"data"`).
/// Mount a persistent volume there in deployment.
pub fn data_dir() -> PathBuf {
    PathBuf::from(std::env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()))
}

// ---------------------------------------------------------------------------
// RunLog
// ---------------------------------------------------------------------------

pub struct RunLog {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    events: Vec<RunEvent>,
    seq: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunEvent {
    pub seq: u32,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SearchQuery {
        query: String,
        result_count: u32,
        units_charged: u32,
    },
    ProviderSkip {
        scope: String,
        detail: String,
    },
    CandidateRejected {
        external_id: String,
        reason: RejectReason,
        reasoning: String,
    },
    CandidateAdmitted {
        external_id: String,
        title: String,
        destination: AdmitDestination,
        quality_score: f32,
        reasoning: String,
    },
    InstructorDiscovered {
        name: String,
        tier: InstructorTier,
    },
    QuotaCheckpoint {
        units_used: u32,
        remaining: u32,
    },
    RunHalted {
        reason: HaltReason,
    },
}

impl RunLog {
    pub fn new(run_id: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            started_at,
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn log(&mut self, kind: EventKind) {
        self.events.push(RunEvent {
            seq: self.seq,
            ts: Utc::now(),
            kind,
        });
        self.seq += 1;
    }

    /// Serialize the run log to JSON and write to disk.
    /// Returns the file path on success.
    pub fn save(&self, record: &RunRecord) -> Result<PathBuf> {
        let dir = data_dir().join("curator-runs");
        std::fs::create_dir_all(&dir)?;

        let path = dir.join(format!("{}.json", self.run_id));

        let output = SerializedRunLog {
            record,
            events: &self.events,
        };

        std::fs::write(&path, serde_json::to_string_pretty(&output)?)?;
        info!(path = %path.display(), events = self.events.len(), "Curation run log saved");

        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Serialization wrappers
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct SerializedRunLog<'a> {
    #[serde(flatten)]
    record: &'a RunRecord,
    events: &'a [RunEvent],
}

/// A run log read back from disk. This is the queryable audit surface for
/// reporting: acceptance-rate statistics can be recomputed from `events` and
/// checked against the `record` counters.
#[derive(Debug, Deserialize)]
pub struct PersistedRunLog {
    #[serde(flatten)]
    pub record: RunRecord,
    pub events: Vec<RunEvent>,
}

impl PersistedRunLog {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("corrupt run log in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn init_data_dir() {
        static ONCE: std::sync::Once = std::sync::Once::new();
        ONCE.call_once(|| {
            let dir = tempfile::tempdir().unwrap();
            std::env::set_var("DATA_DIR", dir.path());
            std::mem::forget(dir);
        });
    }

    #[test]
    fn saves_record_and_ordered_events() {
        init_data_dir();

        let mut log = RunLog::new("run-test-1".into(), Utc::now());
        log.log(EventKind::SearchQuery {
            query: "armbar instructional".into(),
            result_count: 3,
            units_charged: 100,
        });
        log.log(EventKind::CandidateRejected {
            external_id: "vid1".into(),
            reason: RejectReason::TooShort,
            reasoning: "duration 65s below 70s minimum".into(),
        });

        let mut rejected = BTreeMap::new();
        rejected.insert(RejectReason::TooShort, 1);
        let record = RunRecord {
            run_id: "run-test-1".into(),
            started_at: log.started_at,
            completed_at: Utc::now(),
            searches_performed: 1,
            candidates_scanned: 3,
            admitted: 0,
            rejected_reasons: rejected,
            provider_errors: 0,
            classifier_failures: 0,
            quota_units_used: 101,
            halt_reason: None,
        };

        let path = log.save(&record).unwrap();
        let raw = std::fs::read_to_string(path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["run_id"], "run-test-1");
        assert_eq!(value["rejected_reasons"]["too_short"], 1);
        assert_eq!(value["events"][0]["seq"], 0);
        assert_eq!(value["events"][0]["type"], "search_query");
        assert_eq!(value["events"][1]["type"], "candidate_rejected");
        assert_eq!(value["events"][1]["reason"], "too_short");
    }

    #[test]
    fn persisted_log_loads_back_for_reporting() {
        init_data_dir();

        let mut log = RunLog::new("run-test-2".into(), Utc::now());
        log.log(EventKind::CandidateRejected {
            external_id: "vid1".into(),
            reason: RejectReason::LanguageMismatch,
            reasoning: "metadata language outside the allowed set".into(),
        });
        log.log(EventKind::CandidateAdmitted {
            external_id: "vid2".into(),
            title: "Armbar from closed guard".into(),
            destination: AdmitDestination::AutoPublish,
            quality_score: 8.2,
            reasoning: "score 8.2 meets threshold 7.5".into(),
        });

        let mut rejected = BTreeMap::new();
        rejected.insert(RejectReason::LanguageMismatch, 1);
        let record = RunRecord {
            run_id: "run-test-2".into(),
            started_at: log.started_at,
            completed_at: Utc::now(),
            searches_performed: 1,
            candidates_scanned: 2,
            admitted: 1,
            rejected_reasons: rejected,
            provider_errors: 0,
            classifier_failures: 0,
            quota_units_used: 101,
            halt_reason: None,
        };

        let path = log.save(&record).unwrap();
        let loaded = PersistedRunLog::load(&path).unwrap();

        assert_eq!(loaded.record.run_id, "run-test-2");
        assert_eq!(loaded.record.admitted, 1);
        assert_eq!(loaded.events.len(), 2);
        assert!(matches!(
            loaded.events[1].kind,
            EventKind::CandidateAdmitted { .. }
        ));
    }
}
