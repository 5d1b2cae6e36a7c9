use std::time::Duration;

use ai_client::Claude;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use studyreel_common::{AnalysisResult, Candidate};

/// What the model returns for the primary classification pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationResponse {
    /// Whether the video actually teaches a technique, as opposed to
    /// competition footage, highlights, podcasts, or vlogs.
    pub is_instructional: bool,
    /// Name of the person doing the teaching, if stated in the metadata.
    pub instructor_name: Option<String>,
    /// The primary technique taught, lowercase, e.g. "armbar from closed guard".
    pub technique: Option<String>,
    /// Teaching quality estimate from 0 to 10.
    pub quality_score: f32,
    /// One or two sentences justifying the verdict.
    pub reasoning: String,
}

/// What the model returns for the quality-control pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QcResponse {
    /// Whether the first-pass verdict holds up under scrutiny.
    pub approved: bool,
    pub reasoning: String,
}

/// Outcome of stage two, kept for the analysis log.
#[derive(Debug, Clone)]
pub struct QcReview {
    pub approved: bool,
    pub reasoning: String,
}

/// Combined verdict across both stages. `approved` is true only when every
/// stage that ran approved; a stage rejection is final for this candidate
/// within this run.
#[derive(Debug, Clone)]
pub struct ClassifierVerdict {
    pub analysis: AnalysisResult,
    /// None when the QC stage was skipped (stage one rejected, or disabled).
    pub qc: Option<QcReview>,
    /// True when a transport, timeout, or schema failure forced the
    /// fail-closed result.
    pub failed: bool,
    pub approved: bool,
}

impl ClassifierVerdict {
    pub fn fail_closed(reason: impl Into<String>) -> Self {
        Self {
            analysis: AnalysisResult::fail_closed(reason),
            qc: None,
            failed: true,
            approved: false,
        }
    }
}

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are the content screener for a grappling instructional library.

You receive the text metadata of one YouTube video: title, description, and channel name. You never see the video itself. Decide:

- **is_instructional**: true only if the video teaches a technique — step-by-step instruction, concept breakdowns, positional studies. Competition footage, highlight reels, podcasts, interviews, vlogs, gym tours, and reaction content are NOT instructional.
- **instructor_name**: the person teaching, when the metadata states it. The channel name is often the academy, not the instructor — only use it when it plainly names a person. Never guess; leave it out when unsure.
- **technique**: the primary technique or position taught, lowercase ("armbar from closed guard", "half guard passing"). Omit when the video is a general concepts lecture.
- **quality_score**: 0-10 estimate of teaching quality from metadata alone. Anchor points: a named, established instructor teaching a specific technique with a detailed description scores 7-9; a vague title with an empty description scores 3-5; clickbait ("INSTANTLY tap everyone") caps at 4.
- **reasoning**: one or two sentences for the audit log.

Judge only from the given text. A missing description lowers confidence; it does not make a video non-instructional on its own."#;

const QC_SYSTEM_PROMPT: &str = r#"You are the second-pass reviewer for a grappling instructional library.

A first-pass screener approved the video below from its text metadata. Reject it if the approval looks wrong: the title pattern suggests competition footage or highlights rather than instruction, the claimed instructor does not match the metadata, or the quality score is not supported by the text. Approve otherwise.

Be strict about instruction vs. entertainment; be lenient about sparse-but-honest metadata."#;

/// AI classification over candidate text metadata. Stage one classifies;
/// stage two (optional) reviews stage-one approvals. Both must approve.
/// Never errors for content reasons: transport, timeout, and schema
/// failures yield a zero-confidence rejection.
pub struct Classifier {
    claude: Claude,
    qc_enabled: bool,
    timeout: Duration,
}

impl Classifier {
    pub fn new(claude: Claude, qc_enabled: bool, timeout: Duration) -> Self {
        Self {
            claude,
            qc_enabled,
            timeout,
        }
    }

    pub async fn classify(&self, candidate: &Candidate) -> ClassifierVerdict {
        let user_prompt = metadata_prompt(candidate);

        let response: ClassificationResponse = match tokio::time::timeout(
            self.timeout,
            self.claude
                .extract::<ClassificationResponse>(CLASSIFY_SYSTEM_PROMPT, &user_prompt),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(external_id = candidate.external_id.as_str(), error = %e, "Classifier call failed");
                return ClassifierVerdict::fail_closed(format!("classifier failure: {e}"));
            }
            Err(_) => {
                warn!(
                    external_id = candidate.external_id.as_str(),
                    timeout_secs = self.timeout.as_secs(),
                    "Classifier call timed out"
                );
                return ClassifierVerdict::fail_closed("classifier timeout");
            }
        };

        let analysis = AnalysisResult {
            is_instructional: response.is_instructional,
            instructor_name: response
                .instructor_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            technique: response
                .technique
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
            quality_score: response.quality_score.clamp(0.0, 10.0),
            reasoning: response.reasoning,
        };

        if !analysis.is_instructional {
            return ClassifierVerdict {
                analysis,
                qc: None,
                failed: false,
                approved: false,
            };
        }

        if !self.qc_enabled {
            return ClassifierVerdict {
                analysis,
                qc: None,
                failed: false,
                approved: true,
            };
        }

        // Stage two runs only for stage-one approvals.
        let qc_prompt = format!(
            "{user_prompt}\n\nFirst-pass verdict:\ninstructor: {}\ntechnique: {}\nquality_score: {:.1}\nreasoning: {}",
            analysis.instructor_name.as_deref().unwrap_or("(none)"),
            analysis.technique.as_deref().unwrap_or("(none)"),
            analysis.quality_score,
            analysis.reasoning,
        );

        match tokio::time::timeout(
            self.timeout,
            self.claude.extract::<QcResponse>(QC_SYSTEM_PROMPT, &qc_prompt),
        )
        .await
        {
            Ok(Ok(qc)) => {
                if !qc.approved {
                    info!(
                        external_id = candidate.external_id.as_str(),
                        reasoning = qc.reasoning.as_str(),
                        "QC stage rejected candidate"
                    );
                }
                let approved = qc.approved;
                ClassifierVerdict {
                    analysis,
                    qc: Some(QcReview {
                        approved: qc.approved,
                        reasoning: qc.reasoning,
                    }),
                    failed: false,
                    approved,
                }
            }
            Ok(Err(e)) => {
                warn!(external_id = candidate.external_id.as_str(), error = %e, "QC call failed");
                ClassifierVerdict::fail_closed(format!("qc stage failure: {e}"))
            }
            Err(_) => {
                warn!(
                    external_id = candidate.external_id.as_str(),
                    "QC call timed out"
                );
                ClassifierVerdict::fail_closed("qc stage timeout")
            }
        }
    }
}

#[async_trait::async_trait]
impl crate::traits::CandidateClassifier for Classifier {
    async fn classify(&self, candidate: &Candidate) -> ClassifierVerdict {
        Classifier::classify(self, candidate).await
    }
}

fn metadata_prompt(candidate: &Candidate) -> String {
    format!(
        "Title: {}\nChannel: {}\nPublished: {}\nDescription:\n{}",
        candidate.title,
        candidate.source_channel,
        candidate.published_at.format("%Y-%m-%d"),
        truncate(&candidate.description, 4_000),
    )
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
