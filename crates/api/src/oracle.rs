//! HTTP client for the external similarity service.

use std::time::Duration;

use async_trait::async_trait;
use fieldwatch_core::incident::Incident;
use fieldwatch_core::merge::DuplicateCandidate;
use fieldwatch_core::oracle::{OracleError, SimilarityOracle};
use fieldwatch_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};

/// Body sent to `POST {base}/duplicates`.
#[derive(Debug, Serialize)]
struct DuplicateQuery<'a> {
    incident_id: DbId,
    title: &'a str,
    description: &'a str,
    asset_id: Option<DbId>,
    created_at: Timestamp,
}

#[derive(Debug, Deserialize)]
struct DuplicateAnswer {
    candidates: Vec<DuplicateCandidate>,
}

/// [`SimilarityOracle`] backed by the AI service's REST API.
pub struct HttpSimilarityOracle {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSimilarityOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/duplicates", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SimilarityOracle for HttpSimilarityOracle {
    async fn find_duplicates(
        &self,
        incident: &Incident,
    ) -> Result<Vec<DuplicateCandidate>, OracleError> {
        let query = DuplicateQuery {
            incident_id: incident.id,
            title: &incident.title,
            description: &incident.description,
            asset_id: incident.asset_id,
            created_at: incident.created_at,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&query)
            .send()
            .await
            .map_err(|e| OracleError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::HttpStatus(status.as_u16()));
        }

        let answer: DuplicateAnswer = response
            .json()
            .await
            .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
        Ok(answer.candidates)
    }
}

/// Stand-in used when no similarity service is configured.
pub struct DisabledSimilarityOracle;

#[async_trait]
impl SimilarityOracle for DisabledSimilarityOracle {
    async fn find_duplicates(&self, _: &Incident) -> Result<Vec<DuplicateCandidate>, OracleError> {
        Err(OracleError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_tolerates_trailing_slash() {
        let oracle = HttpSimilarityOracle::new("http://ai.local/", Duration::from_secs(1)).unwrap();
        assert_eq!(oracle.endpoint, "http://ai.local/duplicates");
    }

    #[test]
    fn answer_reasons_are_optional() {
        let answer: DuplicateAnswer = serde_json::from_str(
            r#"{"candidates":[{"incident_id":4,"score":0.7},{"incident_id":5,"score":0.9,"reasons":["asset_match"]}]}"#,
        )
        .unwrap();
        assert_eq!(answer.candidates.len(), 2);
        assert!(answer.candidates[0].reasons.is_empty());
    }
}
