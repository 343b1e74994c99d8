//! Structured failure explanations.
//!
//! Each failure mode is one variant carrying exactly the payload it
//! needs; callers match on the variant instead of parsing messages.

use std::fmt;
use std::sync::Arc;

use crate::metadata::{InstallableUnit, Requirement};
use crate::status::Severity;

#[derive(Debug, Clone)]
pub enum Explanation {
    /// A mandatory requirement has no satisfier anywhere in the slice.
    MissingRequirement {
        /// The requiring unit; `None` for an extra requirement injected
        /// directly by the change request.
        unit: Option<Arc<InstallableUnit>>,
        requirement: Requirement,
    },
    /// Satisfiers exist but were excluded by their applicability filter.
    FilteredRequirement {
        unit: Option<Arc<InstallableUnit>>,
        requirement: Requirement,
    },
    /// Two or more versions of a singleton id are simultaneously demanded.
    SingletonViolation { units: Vec<Arc<InstallableUnit>> },
    /// The requirement has satisfiers but none is co-selectable with the
    /// rest of the solution.
    HardRequireConflict {
        unit: Option<Arc<InstallableUnit>>,
        requirement: Requirement,
    },
    /// A selected patch rewrites nothing: its scope or lifecycle leaves
    /// its requirement changes inert.
    PatchMismatch {
        patch: Arc<InstallableUnit>,
        reason: String,
    },
}

impl Explanation {
    pub fn severity(&self) -> Severity {
        match self {
            Explanation::PatchMismatch { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

fn requirer(unit: &Option<Arc<InstallableUnit>>) -> String {
    match unit {
        Some(unit) => unit.to_string(),
        None => "the change request".to_string(),
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Explanation::MissingRequirement { unit, requirement } => write!(
                f,
                "{} requires {} but no satisfying unit was found",
                requirer(unit),
                requirement
            ),
            Explanation::FilteredRequirement { unit, requirement } => write!(
                f,
                "{} requires {} but every candidate is filtered out by the current environment",
                requirer(unit),
                requirement
            ),
            Explanation::SingletonViolation { units } => {
                let names: Vec<String> = units.iter().map(|u| u.to_string()).collect();
                write!(
                    f,
                    "only one version of a singleton unit may be selected, but the request demands {}",
                    names.join(" and ")
                )
            }
            Explanation::HardRequireConflict { unit, requirement } => write!(
                f,
                "{} requires {} but no candidate is compatible with the rest of the solution",
                requirer(unit),
                requirement
            ),
            Explanation::PatchMismatch { patch, reason } => {
                write!(f, "patch {patch} changes nothing: {reason}")
            }
        }
    }
}
