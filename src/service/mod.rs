//! Remote analysis service boundary.
//!
//! Two seams: `DrugSearch` for the typeahead provider and `AnalysisService`
//! for the four analysis calls. `HttpAnalysisClient` implements both against
//! the real service; `MockAnalysisService` implements both for tests.

pub mod http;
pub mod mock;
pub mod types;

pub use http::*;
pub use mock::*;
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{InteractionFindings, Medication, Narrative};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Analysis service is not reachable at {0}")]
    Connection(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Analysis service returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("Expected JSON but received {content_type} (proxy or tunnel interstitial page?)")]
    HtmlResponse { content_type: String },

    #[error("Malformed response: {0}")]
    Protocol(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

/// Coarse failure classes used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The service could not be reached or did not answer in time.
    Connectivity,
    /// The service answered with something other than the expected JSON.
    Protocol,
}

impl ServiceError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connection(_) | Self::Timeout(_) | Self::HttpClient(_) => FailureKind::Connectivity,
            Self::Status { .. } | Self::HtmlResponse { .. } | Self::Protocol(_) => {
                FailureKind::Protocol
            }
        }
    }
}

/// Typeahead lookup contract.
#[async_trait]
pub trait DrugSearch: Send + Sync {
    /// Ranked candidates for a partial drug name.
    async fn search(&self, query: &str) -> Result<Vec<Medication>, ServiceError>;
}

/// The four calls an analysis run is built from.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    /// Resolve submitted names to canonical ids and report pairwise findings.
    async fn resolve_interactions(
        &self,
        medications: &[String],
    ) -> Result<InteractionFindings, ServiceError>;

    async fn food_warnings(&self, drug_ids: &[String]) -> Result<FoodWarningsResponse, ServiceError>;

    async fn references(&self, drug_ids: &[String]) -> Result<ReferencesResponse, ServiceError>;

    /// LLM-backed clinical narrative. The most expensive call by far.
    async fn narrative_report(&self, request: &NarrativeRequest) -> Result<Narrative, ServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_failures_classified() {
        assert_eq!(
            ServiceError::Connection("http://127.0.0.1:8000".into()).kind(),
            FailureKind::Connectivity
        );
        assert_eq!(ServiceError::Timeout(30).kind(), FailureKind::Connectivity);
    }

    #[test]
    fn protocol_failures_classified() {
        assert_eq!(
            ServiceError::HtmlResponse {
                content_type: "text/html".into()
            }
            .kind(),
            FailureKind::Protocol
        );
        assert_eq!(
            ServiceError::Status {
                status: 500,
                body: String::new()
            }
            .kind(),
            FailureKind::Protocol
        );
        assert_eq!(ServiceError::Protocol("eof".into()).kind(), FailureKind::Protocol);
    }

    #[test]
    fn html_error_message_mentions_content_type() {
        let err = ServiceError::HtmlResponse {
            content_type: "text/html; charset=utf-8".into(),
        };
        assert!(err.to_string().contains("text/html; charset=utf-8"));
    }
}
