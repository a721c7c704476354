//! Analysis session: the selection plus the run state machine around it.
//!
//! `Idle → Running → {Succeeded, Failed}`. Succeeded and Failed are resting
//! states from which a new run may start; any effective change to the
//! selection drops the report or error and returns the session to Idle.
//!
//! A run is split into three steps so the caller keeps the session mutable
//! while the remote calls are in flight:
//! `begin_run` (gate, snapshot) → `PendingRun::execute` (no session borrow)
//! → `finish_run` (apply, or discard when the selection moved on).
//!
//! The session only stays `Running` while the run's ticket is alive. Dropping
//! the `PendingRun`, its `execute` future, or the `CompletedRun` (e.g. a
//! cancelled `run()` future) releases the session back to Idle.

use std::sync::{Arc, Weak};

use super::{AnalysisError, AnalysisOrchestrator};
use crate::config::MIN_ANALYSIS_MEDICATIONS;
use crate::models::{Medication, ModelError, PatientField, PatientRecord, Report};
use crate::selection::{MedicationSink, SelectionSnapshot, SelectionState};
use crate::service::AnalysisService;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

pub struct AnalysisSession {
    selection: SelectionState,
    orchestrator: AnalysisOrchestrator,
    state: RunState,
    report: Option<Report>,
    error: Option<AnalysisError>,
    in_flight: Weak<RunTicket>,
}

/// Identity of one started run; the session holds it weakly.
#[derive(Debug)]
struct RunTicket;

/// A started run, detached from the session that started it.
pub struct PendingRun {
    orchestrator: AnalysisOrchestrator,
    snapshot: SelectionSnapshot,
    ticket: Arc<RunTicket>,
}

/// Outcome of a run, tagged with the selection revision it was computed for.
#[derive(Debug)]
pub struct CompletedRun {
    pub revision: u64,
    pub result: Result<Report, AnalysisError>,
    ticket: Arc<RunTicket>,
}

impl PendingRun {
    pub fn snapshot(&self) -> &SelectionSnapshot {
        &self.snapshot
    }

    pub async fn execute(self) -> CompletedRun {
        let result = self.orchestrator.analyze(&self.snapshot).await;
        CompletedRun {
            revision: self.snapshot.revision,
            result,
            ticket: self.ticket,
        }
    }
}

impl AnalysisSession {
    pub fn new(service: Arc<dyn AnalysisService>) -> Self {
        Self::with_selection(service, SelectionState::new())
    }

    pub fn with_selection(service: Arc<dyn AnalysisService>, selection: SelectionState) -> Self {
        Self {
            selection,
            orchestrator: AnalysisOrchestrator::new(service),
            state: RunState::Idle,
            report: None,
            error: None,
            in_flight: Weak::new(),
        }
    }

    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn patient(&self) -> &PatientRecord {
        self.selection.patient()
    }

    pub fn state(&self) -> RunState {
        if self.state == RunState::Running && self.in_flight.strong_count() == 0 {
            return RunState::Idle;
        }
        self.state
    }

    /// The current report; `None` once anything in the selection changed.
    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }

    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    /// Whether the analyze action should be enabled.
    pub fn can_analyze(&self) -> bool {
        self.state() != RunState::Running && self.selection.len() >= MIN_ANALYSIS_MEDICATIONS
    }

    pub fn add_medication(&mut self, medication: Medication) -> bool {
        let added = self.selection.add(medication);
        if added {
            self.invalidate();
        }
        added
    }

    pub fn remove_medication(&mut self, id: &str) -> bool {
        let removed = self.selection.remove(id);
        if removed {
            self.invalidate();
        }
        removed
    }

    pub fn set_patient_field(&mut self, field: PatientField) -> Result<bool, ModelError> {
        let changed = self.selection.set_patient_field(field)?;
        if changed {
            self.invalidate();
        }
        Ok(changed)
    }

    /// Gate and start a run. Clears the previous report and error.
    pub fn begin_run(&mut self) -> Result<PendingRun, AnalysisError> {
        if self.state() == RunState::Running {
            return Err(AnalysisError::AlreadyRunning);
        }
        let selected = self.selection.len();
        if selected < MIN_ANALYSIS_MEDICATIONS {
            return Err(AnalysisError::NotEnoughMedications {
                selected,
                required: MIN_ANALYSIS_MEDICATIONS,
            });
        }

        let ticket = Arc::new(RunTicket);
        self.in_flight = Arc::downgrade(&ticket);
        self.state = RunState::Running;
        self.report = None;
        self.error = None;

        Ok(PendingRun {
            orchestrator: self.orchestrator.clone(),
            snapshot: self.selection.snapshot(),
            ticket,
        })
    }

    /// Give up on the run in flight. Its result, if it still arrives, is
    /// rejected as stale.
    pub fn abandon_run(&mut self) {
        if self.state == RunState::Running {
            tracing::info!("Analysis run abandoned");
            self.state = RunState::Idle;
        }
        self.in_flight = Weak::new();
    }

    /// Apply a finished run. A run computed for an older revision is
    /// discarded and the session goes back to Idle. A run that is no longer
    /// the one in flight (abandoned, or superseded by a newer run) is
    /// discarded without touching the session.
    pub fn finish_run(&mut self, done: CompletedRun) -> Result<&Report, AnalysisError> {
        let ticket = Arc::downgrade(&done.ticket);
        if self.state != RunState::Running || !Weak::ptr_eq(&self.in_flight, &ticket) {
            tracing::info!("Result of an abandoned analysis run, discarding");
            return Err(AnalysisError::Stale);
        }
        self.in_flight = Weak::new();

        let current = self.selection.revision();
        if done.revision != current {
            tracing::info!(
                run_revision = done.revision,
                current_revision = current,
                "Selection changed during analysis, discarding result"
            );
            self.state = RunState::Idle;
            return Err(AnalysisError::Stale);
        }

        match done.result {
            Ok(report) => {
                self.state = RunState::Succeeded;
                Ok(self.report.insert(report))
            }
            Err(e) => {
                self.state = RunState::Failed;
                self.error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Run start to finish with no selection changes in between.
    pub async fn run(&mut self) -> Result<&Report, AnalysisError> {
        let pending = self.begin_run()?;
        let done = pending.execute().await;
        self.finish_run(done)
    }

    fn invalidate(&mut self) {
        if self.report.take().is_some() {
            tracing::debug!("Selection changed, report invalidated");
        }
        self.error = None;
        if matches!(self.state, RunState::Succeeded | RunState::Failed) {
            self.state = RunState::Idle;
        }
    }
}

impl MedicationSink for AnalysisSession {
    fn add_medication(&mut self, medication: Medication) -> bool {
        AnalysisSession::add_medication(self, medication)
    }
}
