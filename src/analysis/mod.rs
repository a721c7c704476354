//! Analysis run: orchestration of the remote calls and the session state
//! machine around it.

pub mod orchestrator;
pub mod session;

pub use orchestrator::*;
pub use session::*;

use thiserror::Error;

use crate::service::ServiceError;

/// The only failure text shown to the user for a run that hit the service.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "Failed to connect to the analysis server. Ensure backend is running.";

/// Remote call within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    FoodWarnings,
    References,
    Narrative,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolve => write!(f, "Interaction resolution"),
            Self::FoodWarnings => write!(f, "Food warnings"),
            Self::References => write!(f, "References"),
            Self::Narrative => write!(f, "Narrative report"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("At least {required} medications are needed (selected {selected})")]
    NotEnoughMedications { selected: usize, required: usize },

    #[error("An analysis is already running")]
    AlreadyRunning,

    #[error("{stage} call failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: ServiceError,
    },

    #[error("Selection changed while the analysis was running")]
    Stale,
}

impl AnalysisError {
    /// Text for the presentation layer. Service failures collapse into one
    /// generic message; the detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Stage { .. } => GENERIC_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}
