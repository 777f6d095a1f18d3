//! AI verification gate: trust classification and the manual override.
//!
//! The confidence score is produced by an external scorer; this module only
//! interprets it. Classification is derived on read and never stored.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::incident::{AiVerificationStatus, Incident};
use crate::types::Timestamp;

/// Scores strictly below this threshold mark a `to_be_verified` incident as
/// spam risk. A score of exactly 0.5 needs review.
pub const SPAM_RISK_THRESHOLD: f64 = 0.5;

/// Triage classification derived from the verification status and score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustClass {
    AwaitingAi,
    SpamRisk,
    NeedsReview,
    Trusted,
    VerificationFailed,
}

impl TrustClass {
    /// Human-readable label shared by every presentation surface.
    pub fn label(self) -> &'static str {
        match self {
            TrustClass::AwaitingAi => "awaiting AI",
            TrustClass::SpamRisk => "spam risk",
            TrustClass::NeedsReview => "needs review",
            TrustClass::Trusted => "trusted",
            TrustClass::VerificationFailed => "verification failed, manual review required",
        }
    }
}

/// Classify a verification state.
///
/// A `to_be_verified` incident without a score is treated as needing review
/// rather than spam.
pub fn classify(status: AiVerificationStatus, score: Option<f64>) -> TrustClass {
    match status {
        AiVerificationStatus::Pending => TrustClass::AwaitingAi,
        AiVerificationStatus::ToBeVerified => match score {
            Some(s) if s < SPAM_RISK_THRESHOLD => TrustClass::SpamRisk,
            _ => TrustClass::NeedsReview,
        },
        AiVerificationStatus::Verified => TrustClass::Trusted,
        AiVerificationStatus::Failed => TrustClass::VerificationFailed,
    }
}

/// Classify an incident.
pub fn classify_incident(incident: &Incident) -> TrustClass {
    classify(incident.ai_verification_status, incident.ai_confidence_score)
}

/// Assessment posted by the external AI scorer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiAssessment {
    pub confidence_score: Option<f64>,
    pub reason: Option<String>,
    /// The scorer could not assess the report.
    #[serde(default)]
    pub failed: bool,
}

impl AiAssessment {
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Some(score) = self.confidence_score {
            if !(0.0..=1.0).contains(&score) {
                return Err(CoreError::Validation(format!(
                    "confidence_score must be between 0 and 1, got {score}"
                )));
            }
        }
        Ok(())
    }
}

fn ensure_open_for_verification(incident: &Incident, command: &'static str) -> Result<(), CoreError> {
    let open = matches!(
        incident.ai_verification_status,
        AiVerificationStatus::Pending | AiVerificationStatus::ToBeVerified
    );
    if incident.status.is_terminal() || !open {
        return Err(CoreError::InvalidTransition {
            from: format!(
                "{} (ai verification {})",
                incident.status, incident.ai_verification_status
            ),
            command,
        });
    }
    Ok(())
}

/// Manual override: mark the incident verified regardless of its score.
pub fn verify(incident: &mut Incident, now: Timestamp) -> Result<(), CoreError> {
    ensure_open_for_verification(incident, "verify")?;
    incident.ai_verification_status = AiVerificationStatus::Verified;
    incident.updated_at = now;
    Ok(())
}

/// Record the external scorer's signal. Never moves an incident to
/// `verified`; that decision is always explicit.
pub fn record_assessment(
    incident: &mut Incident,
    assessment: &AiAssessment,
    now: Timestamp,
) -> Result<(), CoreError> {
    ensure_open_for_verification(incident, "record an AI assessment for")?;
    incident.ai_verification_status = if assessment.failed {
        AiVerificationStatus::Failed
    } else {
        AiVerificationStatus::ToBeVerified
    };
    incident.ai_confidence_score = assessment.confidence_score;
    incident.ai_verification_reason = assessment.reason.clone();
    incident.updated_at = now;
    Ok(())
}
