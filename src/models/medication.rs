use serde::{Deserialize, Serialize};

use super::enums::DrugKind;

/// A medication as returned by the search provider.
///
/// `id` is provider-assigned and unique; `name` is what the user picked and
/// what gets submitted for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: DrugKind,
}

impl Medication {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: DrugKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_search_payload() {
        let med: Medication =
            serde_json::from_str(r#"{"name":"Aspirin","id":"DB00945","type":"Generic"}"#).unwrap();
        assert_eq!(med, Medication::new("DB00945", "Aspirin", DrugKind::Generic));
    }

    #[test]
    fn missing_type_is_unknown() {
        let med: Medication = serde_json::from_str(r#"{"name":"Bayer","id":"BAY01"}"#).unwrap();
        assert_eq!(med.kind, DrugKind::Unknown);
    }

    #[test]
    fn serializes_kind_as_type() {
        let json = serde_json::to_value(Medication::new("W1", "Coumadin", DrugKind::Brand)).unwrap();
        assert_eq!(json["type"], "Brand");
    }
}
