pub mod enums;
pub mod medication;
pub mod patient;
pub mod report;

pub use enums::*;
pub use medication::*;
pub use patient::*;
pub use report::*;

use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ModelError {
    #[error("Invalid {field} value: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("{field} must be between {min} and {max} (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Unknown condition: {0}")]
    UnknownCondition(String),

    #[error("Condition not available for this patient: {0}")]
    ConditionUnavailable(String),
}
