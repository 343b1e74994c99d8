use thiserror::Error;

use crate::filter::FilterError;

/// Errors for malformed inputs. Resolution failures are not errors; they
/// come back as failing plans with status and explanations.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("failed to parse unit descriptor: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("invalid filter expression: {0}")]
    Filter(#[from] FilterError),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
