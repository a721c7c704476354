//! Selection state: the medication list and patient record a run is built from.
//!
//! Pure in-memory state with synchronous transitions. Every effective change
//! bumps `revision`; whoever holds a report compares revisions to know when
//! it went stale.

use crate::config::MAX_MEDICATIONS;
use crate::models::{Medication, ModelError, PatientField, PatientRecord};

/// Anything a picked search candidate can be forwarded to.
pub trait MedicationSink {
    /// Returns whether the medication was added.
    fn add_medication(&mut self, medication: Medication) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct SelectionState {
    medications: Vec<Medication>,
    patient: PatientRecord,
    revision: u64,
}

/// Consistent copy of the selection taken when a run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionSnapshot {
    pub medications: Vec<Medication>,
    pub patient: PatientRecord,
    pub revision: u64,
}

impl SelectionSnapshot {
    /// Names in selection order; this is what the resolve stage submits.
    pub fn medication_names(&self) -> Vec<String> {
        self.medications.iter().map(|m| m.name.clone()).collect()
    }
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing patient record (e.g. a saved profile).
    pub fn with_patient(patient: PatientRecord) -> Self {
        Self {
            patient,
            ..Self::default()
        }
    }

    pub fn medications(&self) -> &[Medication] {
        &self.medications
    }

    pub fn patient(&self) -> &PatientRecord {
        &self.patient
    }

    pub fn len(&self) -> usize {
        self.medications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.medications.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.medications.len() >= MAX_MEDICATIONS
    }

    pub fn contains(&self, id: &str) -> bool {
        self.medications.iter().any(|m| m.id == id)
    }

    /// Monotonic counter, bumped on every effective mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Append a medication. No-op for a duplicate id or a full list.
    pub fn add(&mut self, medication: Medication) -> bool {
        if self.contains(&medication.id) {
            tracing::debug!(id = %medication.id, "Medication already selected");
            return false;
        }
        if self.is_full() {
            tracing::debug!(capacity = MAX_MEDICATIONS, "Selection full, ignoring add");
            return false;
        }
        self.medications.push(medication);
        self.touch();
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.medications.len();
        self.medications.retain(|m| m.id != id);
        let removed = self.medications.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Write one patient field. Rejected writes leave the state untouched.
    pub fn set_patient_field(&mut self, field: PatientField) -> Result<bool, ModelError> {
        let changed = self.patient.apply(field)?;
        if changed {
            self.touch();
        }
        Ok(changed)
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            medications: self.medications.clone(),
            patient: self.patient.clone(),
            revision: self.revision,
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }
}

impl MedicationSink for SelectionState {
    fn add_medication(&mut self, medication: Medication) -> bool {
        self.add(medication)
    }
}
