use serde::{Deserialize, Serialize};

/// Where an admitted candidate landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmitDestination {
    AutoPublish,
    ReviewQueue,
}

impl std::fmt::Display for AdmitDestination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AdmitDestination::AutoPublish => "auto_publish",
            AdmitDestination::ReviewQueue => "review_queue",
        };
        write!(f, "{s}")
    }
}

/// Cumulative counters carried on every progress event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProgressCounts {
    pub searches_performed: u32,
    pub candidates_scanned: u32,
    pub admitted: u32,
    pub quota_units_used: u32,
}

/// Pushed to subscribers after each query and each admission. Delivery is
/// best-effort; a slow subscriber loses events rather than stalling the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    QueryCompleted {
        query: String,
        results: u32,
        counts: ProgressCounts,
    },
    CandidateAdmitted {
        external_id: String,
        title: String,
        destination: AdmitDestination,
        quality_score: f32,
        counts: ProgressCounts,
    },
}
