use std::collections::BTreeSet;

use serde::Serialize;

use super::enums::Gender;
use super::ModelError;

pub const AGE_RANGE: (u32, u32) = (0, 120);
pub const WEIGHT_KG_RANGE: (f64, f64) = (0.0, 300.0);
pub const HEIGHT_CM_RANGE: (f64, f64) = (0.0, 300.0);

/// Starting profile for front ends that collect no patient data; the
/// narrative endpoint requires both.
pub const DEFAULT_AGE: u32 = 65;
pub const DEFAULT_GENDER: Gender = Gender::Male;

pub const PREGNANCY: &str = "Pregnancy";

/// Conditions the patient form offers. Anything else is rejected.
pub const CONDITION_VOCABULARY: &[&str] = &[
    PREGNANCY,
    "Hypertension",
    "Diabetes",
    "Kidney Disease",
    "Liver Disease",
    "Heart Disease",
    "Asthma",
    "Epilepsy",
];

/// One field write on the patient record. `None` clears the field.
#[derive(Debug, Clone, PartialEq)]
pub enum PatientField {
    Age(Option<u32>),
    Gender(Option<Gender>),
    WeightKg(Option<f64>),
    HeightCm(Option<f64>),
    AddCondition(String),
    RemoveCondition(String),
}

/// Patient attributes sent with the narrative request.
///
/// Numeric fields use `None` for an unfilled input, never zero. The record
/// can only change through `apply`, which holds two invariants: values stay
/// in range, and a male patient never carries `Pregnancy`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PatientRecord {
    age: Option<u32>,
    gender: Option<Gender>,
    #[serde(rename = "weight")]
    weight_kg: Option<f64>,
    #[serde(rename = "height")]
    height_cm: Option<f64>,
    conditions: BTreeSet<String>,
}

impl PatientRecord {
    pub fn age(&self) -> Option<u32> {
        self.age
    }

    pub fn gender(&self) -> Option<Gender> {
        self.gender
    }

    pub fn weight_kg(&self) -> Option<f64> {
        self.weight_kg
    }

    pub fn height_cm(&self) -> Option<f64> {
        self.height_cm
    }

    pub fn conditions(&self) -> &BTreeSet<String> {
        &self.conditions
    }

    pub fn has_condition(&self, condition: &str) -> bool {
        canonical_condition(condition).is_some_and(|c| self.conditions.contains(c))
    }

    /// Whether the form may offer `condition` for selection right now.
    pub fn condition_available(&self, condition: &str) -> bool {
        match canonical_condition(condition) {
            Some(PREGNANCY) => self.gender != Some(Gender::Male),
            Some(_) => true,
            None => false,
        }
    }

    /// Apply one field write. Returns whether the record changed.
    ///
    /// Out-of-range values are rejected and leave the record untouched.
    /// Setting gender to `Male` drops `Pregnancy` in the same update.
    pub fn apply(&mut self, field: PatientField) -> Result<bool, ModelError> {
        match field {
            PatientField::Age(age) => {
                if let Some(value) = age {
                    check_range("age", f64::from(value), (
                        f64::from(AGE_RANGE.0),
                        f64::from(AGE_RANGE.1),
                    ))?;
                }
                Ok(replace(&mut self.age, age))
            }
            PatientField::WeightKg(weight) => {
                if let Some(value) = weight {
                    check_range("weight_kg", value, WEIGHT_KG_RANGE)?;
                }
                Ok(replace(&mut self.weight_kg, weight))
            }
            PatientField::HeightCm(height) => {
                if let Some(value) = height {
                    check_range("height_cm", value, HEIGHT_CM_RANGE)?;
                }
                Ok(replace(&mut self.height_cm, height))
            }
            PatientField::Gender(gender) => {
                let dropped_pregnancy =
                    gender == Some(Gender::Male) && self.conditions.remove(PREGNANCY);
                Ok(replace(&mut self.gender, gender) || dropped_pregnancy)
            }
            PatientField::AddCondition(condition) => {
                let canonical = canonical_condition(&condition)
                    .ok_or(ModelError::UnknownCondition(condition.clone()))?;
                if !self.condition_available(canonical) {
                    return Err(ModelError::ConditionUnavailable(canonical.to_string()));
                }
                Ok(self.conditions.insert(canonical.to_string()))
            }
            PatientField::RemoveCondition(condition) => Ok(canonical_condition(&condition)
                .is_some_and(|c| self.conditions.remove(c))),
        }
    }
}

/// Map user input onto the vocabulary spelling.
pub fn canonical_condition(condition: &str) -> Option<&'static str> {
    let wanted = condition.trim();
    CONDITION_VOCABULARY
        .iter()
        .copied()
        .find(|c| c.eq_ignore_ascii_case(wanted))
}

fn check_range(field: &'static str, value: f64, (min, max): (f64, f64)) -> Result<(), ModelError> {
    // NaN fails both comparisons, so test for containment instead of exclusion
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ModelError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        false
    } else {
        *slot = value;
        true
    }
}
