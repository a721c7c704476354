use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::{
    DrugIdsRequest, FoodWarningsResponse, MechanismResult, MedicationsRequest, NarrativeRequest,
    RecommendationResult, ReferencesResponse, RiskResult, SeverityResult, StageResults,
};
use super::{AnalysisService, DrugSearch, ServiceError};
use crate::config::ClientConfig;
use crate::models::{InteractionFindings, Medication, Narrative};

/// Tunnels like ngrok answer browsers with a warning page unless this is set.
pub const TUNNEL_BYPASS_HEADER: &str = "ngrok-skip-browser-warning";

/// HTTP client for the remote analysis service.
pub struct HttpAnalysisClient {
    base_url: String,
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpAnalysisClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if config.sends_tunnel_bypass() {
            headers.insert(
                HeaderName::from_static(TUNNEL_BYPASS_HEADER),
                HeaderValue::from_static("true"),
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ServiceError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Client for a service on localhost:8000 with default timeouts.
    pub fn default_local() -> Result<Self, ServiceError> {
        Self::new(&ClientConfig::default())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Per-pair severity classification (`/analyze/severity`).
    pub async fn classify_severity(
        &self,
        request: &NarrativeRequest,
    ) -> Result<Vec<SeverityResult>, ServiceError> {
        let parsed: StageResults<SeverityResult> = self.post("/analyze/severity", request).await?;
        Ok(parsed.results)
    }

    /// Pharmacological mechanism per pair (`/analyze/mechanism`).
    pub async fn explain_mechanism(
        &self,
        request: &NarrativeRequest,
    ) -> Result<Vec<MechanismResult>, ServiceError> {
        let parsed: StageResults<MechanismResult> = self.post("/analyze/mechanism", request).await?;
        Ok(parsed.results)
    }

    /// Clinical recommendation per pair (`/analyze/recommendation`).
    pub async fn recommend(
        &self,
        request: &NarrativeRequest,
    ) -> Result<Vec<RecommendationResult>, ServiceError> {
        let parsed: StageResults<RecommendationResult> =
            self.post("/analyze/recommendation", request).await?;
        Ok(parsed.results)
    }

    /// Patient-specific risk per pair (`/analyze/risk`).
    pub async fn assess_risk(
        &self,
        request: &NarrativeRequest,
    ) -> Result<Vec<RiskResult>, ServiceError> {
        let parsed: StageResults<RiskResult> = self.post("/analyze/risk", request).await?;
        Ok(parsed.results)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(path, response).await
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T, ServiceError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        self.decode(path, response).await
    }

    /// Turn a response into `T`, failing closed on anything that is not a
    /// successful JSON body.
    async fn decode<T: DeserializeOwned>(
        &self,
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, ServiceError> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        // Interstitial pages come back as HTML, sometimes with a 200
        if content_type.contains("text/html") {
            tracing::warn!(path, status = status.as_u16(), "Received HTML instead of JSON");
            return Err(ServiceError::HtmlResponse { content_type });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.transport_error(e))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ServiceError::Protocol(format!("{path}: {e}")))
    }

    fn transport_error(&self, e: reqwest::Error) -> ServiceError {
        if e.is_timeout() {
            ServiceError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            ServiceError::Connection(self.base_url.clone())
        } else if e.is_decode() || e.is_body() {
            ServiceError::Protocol(e.to_string())
        } else {
            ServiceError::HttpClient(e.to_string())
        }
    }
}

#[async_trait]
impl DrugSearch for HttpAnalysisClient {
    async fn search(&self, query: &str) -> Result<Vec<Medication>, ServiceError> {
        let payload: serde_json::Value = self.get("/search", &[("q", query)]).await?;
        if !payload.is_array() {
            tracing::warn!(kind = json_kind(&payload), "Search returned a non-array payload");
            return Ok(Vec::new());
        }
        serde_json::from_value(payload).map_err(|e| ServiceError::Protocol(format!("/search: {e}")))
    }
}

#[async_trait]
impl AnalysisService for HttpAnalysisClient {
    async fn resolve_interactions(
        &self,
        medications: &[String],
    ) -> Result<InteractionFindings, ServiceError> {
        self.post("/analyze/interactions", &MedicationsRequest { medications })
            .await
    }

    async fn food_warnings(&self, drug_ids: &[String]) -> Result<FoodWarningsResponse, ServiceError> {
        self.post("/analyze/food", &DrugIdsRequest { drug_ids }).await
    }

    async fn references(&self, drug_ids: &[String]) -> Result<ReferencesResponse, ServiceError> {
        self.post("/analyze/references", &DrugIdsRequest { drug_ids })
            .await
    }

    async fn narrative_report(&self, request: &NarrativeRequest) -> Result<Narrative, ServiceError> {
        self.post("/analyze/report", request).await
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
