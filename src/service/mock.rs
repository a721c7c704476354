use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::types::{FoodWarningsResponse, NarrativeRequest, ReferencesResponse};
use super::{AnalysisService, DrugSearch, ServiceError};
use crate::models::{DrugReferences, InteractionFindings, Medication, Narrative};

/// Which remote call a recorded invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceCall {
    Search,
    Resolve,
    FoodWarnings,
    References,
    Narrative,
}

/// One invocation seen by the mock, with its request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    Search(String),
    Resolve(Vec<String>),
    FoodWarnings(Vec<String>),
    References(Vec<String>),
    Narrative(NarrativeRequest),
}

impl RecordedCall {
    pub fn call(&self) -> ServiceCall {
        match self {
            Self::Search(_) => ServiceCall::Search,
            Self::Resolve(_) => ServiceCall::Resolve,
            Self::FoodWarnings(_) => ServiceCall::FoodWarnings,
            Self::References(_) => ServiceCall::References,
            Self::Narrative(_) => ServiceCall::Narrative,
        }
    }
}

/// Mock analysis service for testing: canned responses, injectable
/// failures and latencies, and a log of every call it received.
pub struct MockAnalysisService {
    findings: InteractionFindings,
    food: BTreeMap<String, Vec<String>>,
    references: BTreeMap<String, DrugReferences>,
    narrative: Narrative,
    search_results: HashMap<String, Vec<Medication>>,
    search_delays: HashMap<String, Duration>,
    search_failures: HashMap<String, ServiceError>,
    delays: HashMap<ServiceCall, Duration>,
    failures: HashMap<ServiceCall, ServiceError>,
    calls: Mutex<Vec<(RecordedCall, Instant)>>,
}

impl Default for MockAnalysisService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAnalysisService {
    pub fn new() -> Self {
        Self {
            findings: InteractionFindings::default(),
            food: BTreeMap::new(),
            references: BTreeMap::new(),
            narrative: Narrative::no_interactions(),
            search_results: HashMap::new(),
            search_delays: HashMap::new(),
            search_failures: HashMap::new(),
            delays: HashMap::new(),
            failures: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_findings(mut self, findings: InteractionFindings) -> Self {
        self.findings = findings;
        self
    }

    pub fn with_food(mut self, drug: &str, warnings: &[&str]) -> Self {
        self.food.insert(
            drug.to_string(),
            warnings.iter().map(|w| w.to_string()).collect(),
        );
        self
    }

    pub fn with_references(mut self, drug: &str, references: DrugReferences) -> Self {
        self.references.insert(drug.to_string(), references);
        self
    }

    pub fn with_narrative(mut self, narrative: Narrative) -> Self {
        self.narrative = narrative;
        self
    }

    pub fn with_search_results(mut self, query: &str, results: Vec<Medication>) -> Self {
        self.search_results.insert(query.to_string(), results);
        self
    }

    pub fn with_search_delay(mut self, query: &str, delay: Duration) -> Self {
        self.search_delays.insert(query.to_string(), delay);
        self
    }

    pub fn with_search_failure(mut self, query: &str, error: ServiceError) -> Self {
        self.search_failures.insert(query.to_string(), error);
        self
    }

    pub fn with_delay(mut self, call: ServiceCall, delay: Duration) -> Self {
        self.delays.insert(call, delay);
        self
    }

    pub fn failing(mut self, call: ServiceCall, error: ServiceError) -> Self {
        self.failures.insert(call, error);
        self
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock_calls().iter().map(|(c, _)| c.clone()).collect()
    }

    pub fn count(&self, call: ServiceCall) -> usize {
        self.lock_calls().iter().filter(|(c, _)| c.call() == call).count()
    }

    /// When the first call of this kind was issued.
    pub fn issued_at(&self, call: ServiceCall) -> Option<Instant> {
        self.lock_calls()
            .iter()
            .find(|(c, _)| c.call() == call)
            .map(|(_, at)| *at)
    }

    /// Queries the search endpoint actually received.
    pub fn search_queries(&self) -> Vec<String> {
        self.lock_calls()
            .iter()
            .filter_map(|(c, _)| match c {
                RecordedCall::Search(q) => Some(q.clone()),
                _ => None,
            })
            .collect()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(RecordedCall, Instant)>> {
        // A panicking test thread must not hide the log from the next assertion
        self.calls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, recorded: RecordedCall) -> Result<(), ServiceError> {
        let call = recorded.call();
        self.lock_calls().push((recorded, Instant::now()));
        if let Some(delay) = self.delays.get(&call) {
            tokio::time::sleep(*delay).await;
        }
        match self.failures.get(&call) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DrugSearch for MockAnalysisService {
    async fn search(&self, query: &str) -> Result<Vec<Medication>, ServiceError> {
        self.enter(RecordedCall::Search(query.to_string())).await?;
        if let Some(delay) = self.search_delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if let Some(error) = self.search_failures.get(query) {
            return Err(error.clone());
        }
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl AnalysisService for MockAnalysisService {
    async fn resolve_interactions(
        &self,
        medications: &[String],
    ) -> Result<InteractionFindings, ServiceError> {
        self.enter(RecordedCall::Resolve(medications.to_vec())).await?;
        Ok(self.findings.clone())
    }

    async fn food_warnings(&self, drug_ids: &[String]) -> Result<FoodWarningsResponse, ServiceError> {
        self.enter(RecordedCall::FoodWarnings(drug_ids.to_vec())).await?;
        Ok(FoodWarningsResponse {
            food_warnings: self.food.clone(),
        })
    }

    async fn references(&self, drug_ids: &[String]) -> Result<ReferencesResponse, ServiceError> {
        self.enter(RecordedCall::References(drug_ids.to_vec())).await?;
        Ok(ReferencesResponse {
            references: self.references.clone(),
        })
    }

    async fn narrative_report(&self, request: &NarrativeRequest) -> Result<Narrative, ServiceError> {
        self.enter(RecordedCall::Narrative(request.clone())).await?;
        Ok(self.narrative.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DrugKind;

    #[tokio::test]
    async fn mock_returns_configured_search_results() {
        let mock = MockAnalysisService::new().with_search_results(
            "asp",
            vec![Medication::new("ASP01", "Aspirin", DrugKind::Generic)],
        );
        let results = mock.search("asp").await.unwrap();
        assert_eq!(results[0].id, "ASP01");
        assert!(mock.search("zzz").await.unwrap().is_empty());
        assert_eq!(mock.search_queries(), ["asp", "zzz"]);
    }

    #[tokio::test]
    async fn mock_injects_failures_and_still_records() {
        let mock = MockAnalysisService::new()
            .failing(ServiceCall::FoodWarnings, ServiceError::Timeout(5));
        let err = mock.food_warnings(&["ASP01".to_string()]).await.unwrap_err();
        assert_eq!(err, ServiceError::Timeout(5));
        assert_eq!(mock.count(ServiceCall::FoodWarnings), 1);
        assert_eq!(
            mock.calls(),
            [RecordedCall::FoodWarnings(vec!["ASP01".to_string()])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn mock_delays_calls() {
        let mock = MockAnalysisService::new().with_delay(ServiceCall::Resolve, Duration::from_millis(250));
        let start = Instant::now();
        mock.resolve_interactions(&[]).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(250));
        assert_eq!(mock.issued_at(ServiceCall::Resolve), Some(start));
    }
}
