use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{DrugReferences, InteractionRecord, PatientRecord};

/// Request body for `/analyze/interactions`
#[derive(Serialize)]
pub(crate) struct MedicationsRequest<'a> {
    pub medications: &'a [String],
}

/// Request body for `/analyze/food` and `/analyze/references`
#[derive(Serialize)]
pub(crate) struct DrugIdsRequest<'a> {
    pub drug_ids: &'a [String],
}

/// Request body for `/analyze/report` and the per-stage AI endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NarrativeRequest {
    pub interactions: Vec<InteractionRecord>,
    pub patient: PatientRecord,
    pub drug_ids: Vec<String>,
}

/// Response body from `/analyze/food`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FoodWarningsResponse {
    pub food_warnings: BTreeMap<String, Vec<String>>,
}

/// Response body from `/analyze/references`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencesResponse {
    pub references: BTreeMap<String, DrugReferences>,
}

/// Envelope shared by the per-stage AI endpoints.
#[derive(Deserialize)]
pub(crate) struct StageResults<T> {
    pub results: Vec<T>,
}

/// Response item from `/analyze/severity`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SeverityResult {
    pub drug_a: String,
    pub drug_b: String,
    pub severity: String,
    #[serde(default)]
    pub short_reason: String,
}

/// Response item from `/analyze/mechanism`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MechanismResult {
    pub drug_a: String,
    pub drug_b: String,
    pub interaction_summary: String,
}

/// Response item from `/analyze/recommendation`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecommendationResult {
    pub drug_a: String,
    pub drug_b: String,
    pub recommendation: String,
}

/// Response item from `/analyze/risk`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RiskResult {
    pub drug_a: String,
    pub drug_b: String,
    pub patient_risk: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Gender, PatientField};

    #[test]
    fn narrative_request_shape() {
        let mut patient = PatientRecord::default();
        patient.apply(PatientField::Age(Some(70))).unwrap();
        patient.apply(PatientField::Gender(Some(Gender::Female))).unwrap();

        let request = NarrativeRequest {
            interactions: vec![InteractionRecord::new("ASP01", "WAR01", "Bleeding risk")],
            patient,
            drug_ids: vec!["ASP01".into(), "WAR01".into()],
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["interactions"][0]["drug_a"], "ASP01");
        assert_eq!(json["patient"]["age"], 70);
        assert_eq!(json["patient"]["gender"], "Female");
        assert_eq!(json["drug_ids"][1], "WAR01");
    }

    #[test]
    fn food_response_parses() {
        let parsed: FoodWarningsResponse = serde_json::from_str(
            r#"{"food_warnings":{"Warfarin":["Avoid large amounts of vitamin K"]}}"#,
        )
        .unwrap();
        assert_eq!(parsed.food_warnings["Warfarin"].len(), 1);
    }

    #[test]
    fn references_response_rejects_wrong_shape() {
        let parsed = serde_json::from_str::<ReferencesResponse>(r#"{"references":["oops"]}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn severity_results_envelope() {
        let parsed: StageResults<SeverityResult> = serde_json::from_str(
            r#"{"results":[{"drug_a":"A","drug_b":"B","severity":"High","short_reason":"bleeding"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.results[0].severity, "High");
    }
}
