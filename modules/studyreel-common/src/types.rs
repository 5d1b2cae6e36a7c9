use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Search ---

/// One provider query, bound to the technique and/or instructor it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    pub technique: Option<String>,
    pub instructor: Option<String>,
}

impl SearchQuery {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            technique: None,
            instructor: None,
        }
    }
}

/// A raw search result. Ephemeral — never persisted unless admitted.
/// `duration_seconds` is absent until the secondary metadata fetch fills it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub external_id: String,
    pub title: String,
    pub description: String,
    pub source_channel: String,
    pub published_at: DateTime<Utc>,
    pub duration_seconds: Option<u32>,
}

// --- Classification ---

/// Classifier output for one candidate. Produced at most once per candidate
/// per run, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_instructional: bool,
    pub instructor_name: Option<String>,
    pub technique: Option<String>,
    /// 0.0..=10.0
    pub quality_score: f32,
    pub reasoning: String,
}

impl AnalysisResult {
    /// Fail-closed result for transport/schema/timeout failures: ambiguity
    /// never defaults to approval.
    pub fn fail_closed(reason: impl Into<String>) -> Self {
        Self {
            is_instructional: false,
            instructor_name: None,
            technique: None,
            quality_score: 0.0,
            reasoning: reason.into(),
        }
    }
}

// --- Instructors ---

/// Credibility tier. Tier 1 is the most established. Transitions are
/// monotonic toward tier 1 absent an explicit admin revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InstructorTier {
    Tier1,
    Tier2,
    Tier3,
}

impl InstructorTier {
    /// Numeric rank, lower is better.
    pub fn rank(self) -> u8 {
        match self {
            InstructorTier::Tier1 => 1,
            InstructorTier::Tier2 => 2,
            InstructorTier::Tier3 => 3,
        }
    }
}

impl std::fmt::Display for InstructorTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier-{}", self.rank())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructorStatus {
    PendingReview,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    Curated,
    AutoDiscovered,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instructor {
    pub id: Uuid,
    pub name: String,
    pub tier: InstructorTier,
    pub credibility_evidence: String,
    pub discovery: DiscoveryMethod,
    pub status: InstructorStatus,
    pub active: bool,
    /// Alternate spellings mapped onto this entry by explicit admin action.
    pub aliases: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// --- Library ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Active,
    PendingReview,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Globally unique across the library and the review queue.
    pub external_id: String,
    pub title: String,
    pub instructor_ref: Option<Uuid>,
    /// Free-text instructor name when no registry link was established.
    pub instructor_name: Option<String>,
    pub technique: Option<String>,
    pub quality_score: f32,
    pub status: EntryStatus,
    pub admitted_at: DateTime<Utc>,
}

// --- Rejections ---

/// Expected business rejections, tallied separately so acceptance-rate
/// reporting stays accurate.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Duplicate,
    TooShort,
    LanguageMismatch,
    LowQuality,
    BelowThreshold,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectReason::Duplicate => "duplicate",
            RejectReason::TooShort => "too_short",
            RejectReason::LanguageMismatch => "language_mismatch",
            RejectReason::LowQuality => "low_quality",
            RejectReason::BelowThreshold => "below_threshold",
        };
        write!(f, "{s}")
    }
}

// --- Runs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    QuotaExhausted,
    ProviderErrors,
    Cancelled,
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HaltReason::QuotaExhausted => "quota_exhausted",
            HaltReason::ProviderErrors => "provider_errors",
            HaltReason::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// One per run, append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub searches_performed: u32,
    pub candidates_scanned: u32,
    pub admitted: u32,
    pub rejected_reasons: BTreeMap<RejectReason, u32>,
    /// Candidates/queries skipped because the provider failed, distinct from
    /// content rejections.
    pub provider_errors: u32,
    /// Classifier transport/schema failures, folded into fail-closed results.
    pub classifier_failures: u32,
    pub quota_units_used: u32,
    pub halt_reason: Option<HaltReason>,
}

// --- Quota ---

/// Singleton daily budget state, persisted across process restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaState {
    pub units_used_today: u32,
    pub daily_limit: u32,
    pub last_reset_at: DateTime<Utc>,
}

impl QuotaState {
    pub fn fresh(daily_limit: u32, now: DateTime<Utc>) -> Self {
        Self {
            units_used_today: 0,
            daily_limit,
            last_reset_at: now,
        }
    }
}
