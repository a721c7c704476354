use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::Severity;

pub const NO_INTERACTIONS_ANALYSIS: &str = "No interactions found.";

/// Pairwise finding between two canonical drug ids.
///
/// Fields the client does not interpret are kept in `extra` so the record
/// goes back to the narrative call exactly as the service produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub drug_a: String,
    pub drug_b: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InteractionRecord {
    pub fn new(drug_a: &str, drug_b: &str, description: &str) -> Self {
        Self {
            drug_a: drug_a.to_string(),
            drug_b: drug_b.to_string(),
            description: description.to_string(),
            severity: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn severity_level(&self) -> Severity {
        self.severity
            .as_deref()
            .map(Severity::classify)
            .unwrap_or(Severity::Unknown)
    }
}

/// Payload of the resolve stage, kept verbatim in the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionFindings {
    /// Submitted name → canonical drug id. Unresolved names are absent.
    pub resolved_medications: BTreeMap<String, String>,
    #[serde(default)]
    pub interactions_found: Vec<InteractionRecord>,
    /// Top-level fields the client does not interpret, kept for the report.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl InteractionFindings {
    pub fn has_interactions(&self) -> bool {
        !self.interactions_found.is_empty()
    }
}

/// Literature attached to one drug.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrugReferences {
    #[serde(default)]
    pub articles: Vec<String>,
    /// `"label: url"` strings; see `ReferenceLink::parse`.
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub books: Vec<String>,
}

impl DrugReferences {
    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
            && self.links.is_empty()
            && self.attachments.is_empty()
            && self.books.is_empty()
    }

    /// Links that carry a usable URL.
    pub fn parsed_links(&self) -> Vec<ReferenceLink> {
        self.links
            .iter()
            .chain(self.attachments.iter())
            .filter_map(|raw| ReferenceLink::parse(raw))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceLink {
    pub label: String,
    pub url: String,
}

impl ReferenceLink {
    /// Split a `"label: url"` entry. Labels may themselves contain colons,
    /// so the split happens right before the URL scheme.
    pub fn parse(raw: &str) -> Option<Self> {
        let (start, scheme_len) = ["http://", "https://"]
            .iter()
            .filter_map(|scheme| raw.find(scheme).map(|at| (at, scheme.len())))
            .min_by_key(|(at, _)| *at)?;
        let url = raw[start..].trim();
        let label = raw[..start].trim().trim_end_matches(':').trim();
        if url.len() <= scheme_len {
            return None;
        }
        Some(Self {
            label: if label.is_empty() { url.to_string() } else { label.to_string() },
            url: url.to_string(),
        })
    }
}

/// Per-pair clinical card produced by the narrative call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisCard {
    pub drug_a: String,
    pub drug_b: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub interaction_summary: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default)]
    pub patient_risk: String,
}

impl AnalysisCard {
    pub fn severity_level(&self) -> Severity {
        Severity::classify(&self.severity)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub clinical_analysis: String,
    #[serde(default)]
    pub analysis_cards: Vec<AnalysisCard>,
}

impl Narrative {
    /// Stand-in used when the resolve stage found nothing to explain.
    pub fn no_interactions() -> Self {
        Self {
            clinical_analysis: NO_INTERACTIONS_ANALYSIS.to_string(),
            analysis_cards: Vec::new(),
        }
    }
}

impl Default for Narrative {
    fn default() -> Self {
        Self::no_interactions()
    }
}

/// Merged result of one analysis run. Every field is always present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub interactions: InteractionFindings,
    /// Drug → food/lifestyle warnings.
    pub food: BTreeMap<String, Vec<String>>,
    /// Drug → literature.
    pub references: BTreeMap<String, DrugReferences>,
    pub narrative: Narrative,
    /// Deduplicated canonical ids the fan-out stage was issued for.
    pub drug_ids: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn has_interactions(&self) -> bool {
        self.interactions.has_interactions()
    }

    /// Worst severity across narrative cards and raw findings.
    pub fn highest_severity(&self) -> Severity {
        self.narrative
            .analysis_cards
            .iter()
            .map(AnalysisCard::severity_level)
            .chain(
                self.interactions
                    .interactions_found
                    .iter()
                    .map(InteractionRecord::severity_level),
            )
            .max()
            .unwrap_or(Severity::Unknown)
    }
}
