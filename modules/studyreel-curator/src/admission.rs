//! The admission gate: a pure decision over the classifier verdict and the
//! run-scoped policy. Every decision carries a reasoning string for the run
//! log so acceptance statistics can be rebuilt after the fact.

use studyreel_common::{AdmitDestination, RejectReason};

use crate::classifier::ClassifierVerdict;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Admit(AdmitDestination),
    Reject(RejectReason),
}

/// Run-scoped admission policy. The threshold comes from config or the CLI,
/// never from a per-strategy constant.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionPolicy {
    pub quality_threshold: f32,
    pub manual_review_enabled: bool,
}

impl AdmissionPolicy {
    pub fn decide(&self, verdict: &ClassifierVerdict) -> (AdmissionDecision, String) {
        if !verdict.approved {
            let detail = match &verdict.qc {
                Some(qc) if !qc.approved => format!("qc stage rejected: {}", qc.reasoning),
                _ => format!("classifier rejected: {}", verdict.analysis.reasoning),
            };
            return (AdmissionDecision::Reject(RejectReason::LowQuality), detail);
        }

        let score = verdict.analysis.quality_score;
        if score < self.quality_threshold {
            return (
                AdmissionDecision::Reject(RejectReason::BelowThreshold),
                format!(
                    "score {score:.1} below threshold {:.1}: {}",
                    self.quality_threshold, verdict.analysis.reasoning
                ),
            );
        }

        if self.manual_review_enabled {
            (
                AdmissionDecision::Admit(AdmitDestination::ReviewQueue),
                format!(
                    "score {score:.1} meets threshold {:.1}, manual review enabled: {}",
                    self.quality_threshold, verdict.analysis.reasoning
                ),
            )
        } else {
            (
                AdmissionDecision::Admit(AdmitDestination::AutoPublish),
                format!(
                    "score {score:.1} meets threshold {:.1}: {}",
                    self.quality_threshold, verdict.analysis.reasoning
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{ClassifierVerdict, QcReview};
    use studyreel_common::AnalysisResult;

    fn approved_verdict(score: f32) -> ClassifierVerdict {
        ClassifierVerdict {
            analysis: AnalysisResult {
                is_instructional: true,
                instructor_name: Some("John Danaher".into()),
                technique: Some("armbar from closed guard".into()),
                quality_score: score,
                reasoning: "named instructor, specific technique".into(),
            },
            qc: Some(QcReview {
                approved: true,
                reasoning: "verdict holds".into(),
            }),
            failed: false,
            approved: true,
        }
    }

    fn policy(threshold: f32, manual_review: bool) -> AdmissionPolicy {
        AdmissionPolicy {
            quality_threshold: threshold,
            manual_review_enabled: manual_review,
        }
    }

    #[test]
    fn stage_rejection_is_low_quality() {
        let mut verdict = approved_verdict(9.0);
        verdict.approved = false;
        verdict.qc = Some(QcReview {
            approved: false,
            reasoning: "looks like competition footage".into(),
        });

        let (decision, reasoning) = policy(7.5, false).decide(&verdict);
        assert_eq!(decision, AdmissionDecision::Reject(RejectReason::LowQuality));
        assert!(reasoning.contains("competition footage"));
    }

    #[test]
    fn fail_closed_verdict_is_low_quality_not_threshold() {
        let verdict = ClassifierVerdict::fail_closed("classifier timeout");
        let (decision, _) = policy(0.0, false).decide(&verdict);
        // Even a zero threshold never admits a fail-closed verdict.
        assert_eq!(decision, AdmissionDecision::Reject(RejectReason::LowQuality));
    }

    #[test]
    fn score_below_threshold_rejects() {
        let (decision, _) = policy(7.5, false).decide(&approved_verdict(7.4));
        assert_eq!(
            decision,
            AdmissionDecision::Reject(RejectReason::BelowThreshold)
        );
    }

    #[test]
    fn passing_score_auto_publishes_when_review_disabled() {
        let (decision, _) = policy(7.5, false).decide(&approved_verdict(8.2));
        assert_eq!(
            decision,
            AdmissionDecision::Admit(AdmitDestination::AutoPublish)
        );
    }

    #[test]
    fn manual_review_routes_every_admit_to_the_queue() {
        for score in [7.5, 8.2, 10.0] {
            for threshold in [0.0, 5.0, 7.5] {
                let (decision, _) = policy(threshold, true).decide(&approved_verdict(score));
                assert_eq!(
                    decision,
                    AdmissionDecision::Admit(AdmitDestination::ReviewQueue),
                    "score {score} threshold {threshold}"
                );
            }
        }
    }
}
