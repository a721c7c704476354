use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use super::{AnalysisError, Stage};
use crate::config::MIN_ANALYSIS_MEDICATIONS;
use crate::models::{Narrative, Report};
use crate::selection::SelectionSnapshot;
use crate::service::{AnalysisService, NarrativeRequest, ServiceError};

/// Runs the remote analysis protocol for one selection snapshot.
///
/// Coordinates: resolve → dedup ids → (food ∥ references ∥ narrative?) → merge.
/// Resolve must finish first because every later call needs its ids. The
/// narrative call is only issued when the resolve stage reported findings.
#[derive(Clone)]
pub struct AnalysisOrchestrator {
    service: Arc<dyn AnalysisService>,
}

impl AnalysisOrchestrator {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self { service }
    }

    /// Execute one run. Any failing call fails the whole run; nothing from
    /// the calls that did succeed is returned.
    pub async fn analyze(&self, snapshot: &SelectionSnapshot) -> Result<Report, AnalysisError> {
        let names = snapshot.medication_names();
        if names.len() < MIN_ANALYSIS_MEDICATIONS {
            return Err(AnalysisError::NotEnoughMedications {
                selected: names.len(),
                required: MIN_ANALYSIS_MEDICATIONS,
            });
        }

        let run_id = Uuid::new_v4();
        tracing::info!(%run_id, medications = names.len(), "Analysis run started");
        tracing::debug!(%run_id, ?names, "Submitting medications for resolution");

        // Step 1: Resolve names and find interactions
        let findings = self
            .service
            .resolve_interactions(&names)
            .await
            .map_err(|e| stage_failed(run_id, Stage::Resolve, e))?;

        // Step 2: Collapse brand/generic aliases onto one id
        let drug_ids = canonical_ids(&names, &findings.resolved_medications);
        tracing::info!(
            %run_id,
            resolved = findings.resolved_medications.len(),
            unique_ids = drug_ids.len(),
            interactions = findings.interactions_found.len(),
            "Resolve stage complete"
        );

        // Step 3: Food and references fan out over the same ids
        let food = async {
            self.service
                .food_warnings(&drug_ids)
                .await
                .map_err(|e| stage_failed(run_id, Stage::FoodWarnings, e))
        };
        let references = async {
            self.service
                .references(&drug_ids)
                .await
                .map_err(|e| stage_failed(run_id, Stage::References, e))
        };

        // Step 4: Narrative only when there is something to explain
        let narrative = async {
            if !findings.has_interactions() {
                tracing::info!(%run_id, "No interactions found, narrative call skipped");
                return Ok(Narrative::no_interactions());
            }
            let request = NarrativeRequest {
                interactions: findings.interactions_found.clone(),
                patient: snapshot.patient.clone(),
                drug_ids: drug_ids.clone(),
            };
            self.service
                .narrative_report(&request)
                .await
                .map_err(|e| stage_failed(run_id, Stage::Narrative, e))
        };

        // Step 5: Join everything in flight, first failure wins
        let (food, references, narrative) = tokio::try_join!(food, references, narrative)?;

        tracing::info!(
            %run_id,
            cards = narrative.analysis_cards.len(),
            food_entries = food.food_warnings.len(),
            reference_entries = references.references.len(),
            "Analysis run complete"
        );

        Ok(Report {
            interactions: findings,
            food: food.food_warnings,
            references: references.references,
            narrative,
            drug_ids,
            generated_at: Utc::now(),
        })
    }
}

/// Unique canonical ids in the order their names were submitted.
///
/// Names the service resolved but that were not submitted verbatim (e.g. a
/// normalised spelling) follow in map order.
pub fn canonical_ids(submitted: &[String], resolved: &BTreeMap<String, String>) -> Vec<String> {
    let in_submission_order = submitted.iter().filter_map(|name| resolved.get(name));
    let leftovers = resolved
        .iter()
        .filter(|(name, _)| !submitted.contains(name))
        .map(|(_, id)| id);

    let mut seen = HashSet::new();
    in_submission_order
        .chain(leftovers)
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

fn stage_failed(run_id: Uuid, stage: Stage, source: ServiceError) -> AnalysisError {
    tracing::warn!(%run_id, %stage, kind = ?source.kind(), error = %source, "Analysis run failed");
    AnalysisError::Stage { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::models::{
        AnalysisCard, DrugKind, DrugReferences, InteractionFindings, InteractionRecord,
        Medication, PatientField, NO_INTERACTIONS_ANALYSIS,
    };
    use crate::selection::SelectionState;
    use crate::service::{MockAnalysisService, RecordedCall, ServiceCall};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn resolved(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn aspirin_warfarin() -> SelectionSnapshot {
        let mut state = SelectionState::new();
        state.add(Medication::new("ASP01", "Aspirin", DrugKind::Generic));
        state.add(Medication::new("WAR01", "Warfarin", DrugKind::Generic));
        state.set_patient_field(PatientField::Age(Some(72))).unwrap();
        state.snapshot()
    }

    fn bleeding_findings() -> InteractionFindings {
        InteractionFindings {
            resolved_medications: resolved(&[("Aspirin", "ASP01"), ("Warfarin", "WAR01")]),
            interactions_found: vec![InteractionRecord::new(
                "ASP01",
                "WAR01",
                "The risk or severity of bleeding can be increased.",
            )],
            ..Default::default()
        }
    }

    fn bleeding_narrative() -> Narrative {
        Narrative {
            clinical_analysis: "See cards below".into(),
            analysis_cards: vec![AnalysisCard {
                drug_a: "ASP01".into(),
                drug_b: "WAR01".into(),
                severity: "High".into(),
                interaction_summary: "Additive anticoagulant effect".into(),
                recommendation: "Avoid combination or monitor INR closely".into(),
                patient_risk: "Age over 65 increases bleeding risk".into(),
            }],
        }
    }

    fn orchestrator(mock: &Arc<MockAnalysisService>) -> AnalysisOrchestrator {
        AnalysisOrchestrator::new(mock.clone())
    }

    #[test]
    fn canonical_ids_collapse_aliases() {
        let ids = canonical_ids(
            &names(&["Tylenol", "Acetaminophen", "Warfarin"]),
            &resolved(&[
                ("Tylenol", "DB00316"),
                ("Acetaminophen", "DB00316"),
                ("Warfarin", "DB00682"),
            ]),
        );
        assert_eq!(ids, ["DB00316", "DB00682"]);
    }

    #[test]
    fn canonical_ids_follow_submission_order() {
        let ids = canonical_ids(
            &names(&["Warfarin", "Aspirin"]),
            &resolved(&[("Aspirin", "ASP01"), ("Warfarin", "WAR01")]),
        );
        assert_eq!(ids, ["WAR01", "ASP01"]);
    }

    #[test]
    fn canonical_ids_skip_unresolved_and_keep_extra_keys() {
        let ids = canonical_ids(
            &names(&["Aspirin", "Mystery", "warfarin"]),
            &resolved(&[("Aspirin", "ASP01"), ("Warfarin", "WAR01")]),
        );
        assert_eq!(ids, ["ASP01", "WAR01"]);
    }

    #[tokio::test]
    async fn end_to_end_with_interaction() {
        let mock = Arc::new(
            MockAnalysisService::new()
                .with_findings(bleeding_findings())
                .with_food("Warfarin", &["Avoid large changes in vitamin K intake"])
                .with_references(
                    "Aspirin",
                    DrugReferences {
                        articles: vec!["Antithrombotic Trialists (PMID: 19482214)".into()],
                        ..Default::default()
                    },
                )
                .with_narrative(bleeding_narrative()),
        );
        let snapshot = aspirin_warfarin();

        let report = orchestrator(&mock).analyze(&snapshot).await.unwrap();

        let expected_ids = names(&["ASP01", "WAR01"]);
        let calls = mock.calls();
        assert_eq!(calls[0], RecordedCall::Resolve(names(&["Aspirin", "Warfarin"])));
        assert!(calls.contains(&RecordedCall::FoodWarnings(expected_ids.clone())));
        assert!(calls.contains(&RecordedCall::References(expected_ids.clone())));
        assert_eq!(mock.count(ServiceCall::Narrative), 1);

        assert!(report.has_interactions());
        assert!(!report.narrative.analysis_cards.is_empty());
        assert_eq!(report.drug_ids, expected_ids);
        assert_eq!(report.food["Warfarin"].len(), 1);
        assert_eq!(report.references["Aspirin"].articles.len(), 1);
    }

    #[tokio::test]
    async fn narrative_request_carries_findings_patient_and_ids() {
        let mock = Arc::new(
            MockAnalysisService::new()
                .with_findings(bleeding_findings())
                .with_narrative(bleeding_narrative()),
        );
        let snapshot = aspirin_warfarin();

        orchestrator(&mock).analyze(&snapshot).await.unwrap();

        let narrative_call = mock
            .calls()
            .into_iter()
            .find_map(|c| match c {
                RecordedCall::Narrative(request) => Some(request),
                _ => None,
            })
            .unwrap();
        assert_eq!(narrative_call.interactions, bleeding_findings().interactions_found);
        assert_eq!(narrative_call.patient.age(), Some(72));
        assert_eq!(narrative_call.drug_ids, ["ASP01", "WAR01"]);
    }

    #[tokio::test]
    async fn no_interactions_skips_narrative() {
        let mock = Arc::new(
            MockAnalysisService::new()
                .with_findings(InteractionFindings {
                    resolved_medications: resolved(&[("Aspirin", "ASP01"), ("Warfarin", "WAR01")]),
                    interactions_found: Vec::new(),
                    ..Default::default()
                })
                .with_narrative(bleeding_narrative()),
        );

        let report = orchestrator(&mock).analyze(&aspirin_warfarin()).await.unwrap();

        assert_eq!(mock.count(ServiceCall::Narrative), 0);
        assert_eq!(mock.count(ServiceCall::FoodWarnings), 1);
        assert_eq!(mock.count(ServiceCall::References), 1);
        assert_eq!(report.narrative, Narrative::no_interactions());
        assert_eq!(report.narrative.clinical_analysis, NO_INTERACTIONS_ANALYSIS);
    }

    #[tokio::test]
    async fn duplicate_ids_queried_once_downstream() {
        let mut state = SelectionState::new();
        state.add(Medication::new("MIX01", "Tylenol", DrugKind::Brand));
        state.add(Medication::new("DB00316", "Acetaminophen", DrugKind::Generic));
        state.add(Medication::new("DB00682", "Warfarin", DrugKind::Generic));
        let mock = Arc::new(MockAnalysisService::new().with_findings(InteractionFindings {
            resolved_medications: resolved(&[
                ("Tylenol", "DB00316"),
                ("Acetaminophen", "DB00316"),
                ("Warfarin", "DB00682"),
            ]),
            interactions_found: vec![InteractionRecord::new("DB00316", "DB00682", "INR increase")],
            ..Default::default()
        }));

        let report = orchestrator(&mock).analyze(&state.snapshot()).await.unwrap();

        let expected = names(&["DB00316", "DB00682"]);
        for call in mock.calls() {
            match call {
                RecordedCall::FoodWarnings(ids) | RecordedCall::References(ids) => {
                    assert_eq!(ids, expected)
                }
                RecordedCall::Narrative(request) => assert_eq!(request.drug_ids, expected),
                _ => {}
            }
        }
        assert_eq!(report.drug_ids, expected);
    }

    #[tokio::test]
    async fn fewer_than_two_medications_never_calls_service() {
        let mut state = SelectionState::new();
        state.add(Medication::new("ASP01", "Aspirin", DrugKind::Generic));
        let mock = Arc::new(MockAnalysisService::new());

        let err = orchestrator(&mock).analyze(&state.snapshot()).await.unwrap_err();

        assert_eq!(
            err,
            AnalysisError::NotEnoughMedications {
                selected: 1,
                required: 2
            }
        );
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn resolve_failure_stops_before_fan_out() {
        let mock = Arc::new(
            MockAnalysisService::new().failing(
                ServiceCall::Resolve,
                ServiceError::HtmlResponse {
                    content_type: "text/html".into(),
                },
            ),
        );

        let err = orchestrator(&mock).analyze(&aspirin_warfarin()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Stage { stage: Stage::Resolve, .. }));
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn any_stage_failure_fails_the_run() {
        for failing in [ServiceCall::FoodWarnings, ServiceCall::References, ServiceCall::Narrative] {
            let mock = Arc::new(
                MockAnalysisService::new()
                    .with_findings(bleeding_findings())
                    .with_narrative(bleeding_narrative())
                    .failing(failing, ServiceError::Connection("http://127.0.0.1:8000".into())),
            );

            let result = orchestrator(&mock).analyze(&aspirin_warfarin()).await;

            let err = result.expect_err("run must fail");
            let expected_stage = match failing {
                ServiceCall::FoodWarnings => Stage::FoodWarnings,
                ServiceCall::References => Stage::References,
                _ => Stage::Narrative,
            };
            assert!(
                matches!(err, AnalysisError::Stage { stage, .. } if stage == expected_stage),
                "{failing:?} produced {err:?}"
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_and_narrative_run_concurrently() {
        let mock = Arc::new(
            MockAnalysisService::new()
                .with_findings(bleeding_findings())
                .with_narrative(bleeding_narrative())
                .with_delay(ServiceCall::Resolve, Duration::from_millis(50))
                .with_delay(ServiceCall::FoodWarnings, Duration::from_millis(100))
                .with_delay(ServiceCall::References, Duration::from_millis(150))
                .with_delay(ServiceCall::Narrative, Duration::from_millis(400)),
        );
        let start = Instant::now();

        orchestrator(&mock).analyze(&aspirin_warfarin()).await.unwrap();

        // resolve + max(food, references, narrative), not the sum
        assert_eq!(start.elapsed(), Duration::from_millis(450));

        let resolve_at = mock.issued_at(ServiceCall::Resolve).unwrap();
        let food_at = mock.issued_at(ServiceCall::FoodWarnings).unwrap();
        assert_eq!(food_at - resolve_at, Duration::from_millis(50));
        assert_eq!(mock.issued_at(ServiceCall::References), Some(food_at));
        assert_eq!(mock.issued_at(ServiceCall::Narrative), Some(food_at));
    }

    #[tokio::test(start_paused = true)]
    async fn early_failure_does_not_wait_for_slow_calls() {
        let mock = Arc::new(
            MockAnalysisService::new()
                .with_findings(bleeding_findings())
                .with_delay(ServiceCall::Narrative, Duration::from_secs(60))
                .failing(ServiceCall::References, ServiceError::Timeout(30)),
        );
        let start = Instant::now();

        let err = orchestrator(&mock).analyze(&aspirin_warfarin()).await.unwrap_err();

        assert!(matches!(err, AnalysisError::Stage { stage: Stage::References, .. }));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
