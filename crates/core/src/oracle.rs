//! Seam for the external AI similarity service.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::incident::Incident;
use crate::merge::DuplicateCandidate;

/// Errors from a similarity oracle call. All are retryable from the
/// caller's point of view and never mean "no duplicates".
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Similarity oracle is not configured")]
    NotConfigured,

    #[error("Similarity oracle request failed: {0}")]
    Request(String),

    #[error("Similarity oracle returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Similarity oracle returned an invalid response: {0}")]
    InvalidResponse(String),
}

impl From<OracleError> for CoreError {
    fn from(err: OracleError) -> Self {
        CoreError::ExternalService(err.to_string())
    }
}

/// External scorer returning duplicate candidates for an incident.
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    async fn find_duplicates(
        &self,
        incident: &Incident,
    ) -> Result<Vec<DuplicateCandidate>, OracleError>;
}

/// Reject an oracle answer containing scores outside `[0, 1]`.
pub fn validate_candidates(candidates: &[DuplicateCandidate]) -> Result<(), OracleError> {
    match candidates
        .iter()
        .find(|c| !(0.0..=1.0).contains(&c.score))
    {
        Some(bad) => Err(OracleError::InvalidResponse(format!(
            "score {} for incident {} is outside [0, 1]",
            bad.score, bad.incident_id
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn out_of_range_scores_are_invalid() {
        let candidates = vec![DuplicateCandidate {
            incident_id: 4,
            score: 1.5,
            reasons: vec![],
        }];
        assert_matches!(
            validate_candidates(&candidates),
            Err(OracleError::InvalidResponse(_))
        );
        assert!(validate_candidates(&[]).is_ok());
    }

    #[test]
    fn oracle_errors_become_external_service_errors() {
        let err: CoreError = OracleError::HttpStatus(502).into();
        assert_matches!(err, CoreError::ExternalService(msg) if msg.contains("502"));
        assert!(CoreError::ExternalService(String::new()).is_retryable());
    }
}
