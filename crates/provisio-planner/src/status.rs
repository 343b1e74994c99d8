//! Outcome reporting for planning calls.
//!
//! A planning call never fails by panicking or returning `Err`; it always
//! produces a plan whose status tree describes what happened. Severities
//! escalate: a status inherits the worst severity of its children.

use std::fmt;
use std::sync::Arc;

use crate::metadata::InstallableUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Ok,
    Warning,
    Error,
    Cancel,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Ok => "OK",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Cancel => "CANCEL",
        };
        write!(f, "{label}")
    }
}

/// A status tree node: severity, message, child statuses.
#[derive(Debug, Clone)]
pub struct PlanStatus {
    pub severity: Severity,
    pub message: String,
    pub children: Vec<PlanStatus>,
}

impl PlanStatus {
    pub fn ok() -> Self {
        Self {
            severity: Severity::Ok,
            message: String::new(),
            children: Vec::new(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            children: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            children: Vec::new(),
        }
    }

    pub fn cancel() -> Self {
        Self {
            severity: Severity::Cancel,
            message: "operation cancelled".to_string(),
            children: Vec::new(),
        }
    }

    /// Add a child status, escalating this status's severity to the
    /// child's when the child is worse.
    pub fn add_child(&mut self, child: PlanStatus) {
        self.severity = self.severity.max(child.severity);
        self.children.push(child);
    }

    /// Whether the plan can be executed: OK or WARNING.
    pub fn is_ok(&self) -> bool {
        matches!(self.severity, Severity::Ok | Severity::Warning)
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_cancelled(&self) -> bool {
        self.severity == Severity::Cancel
    }

    /// Multi-line description including children, for diagnostics.
    pub fn describe(&self) -> String {
        let mut lines = Vec::new();
        self.describe_into(&mut lines, 0);
        lines.join("\n")
    }

    fn describe_into(&self, lines: &mut Vec<String>, depth: usize) {
        let indent = "  ".repeat(depth);
        if self.message.is_empty() {
            lines.push(format!("{}{}", indent, self.severity));
        } else {
            lines.push(format!("{}{}: {}", indent, self.severity, self.message));
        }
        for child in &self.children {
            child.describe_into(lines, depth + 1);
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.severity)
        } else {
            write!(f, "{}: {}", self.severity, self.message)
        }
    }
}

/// What a top-level request element asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Add,
    Remove,
}

/// Per-request outcome: whether each requested addition/removal succeeded,
/// was dropped best-effort, or failed.
#[derive(Debug, Clone)]
pub struct RequestStatus {
    pub unit: Arc<InstallableUnit>,
    pub kind: RequestKind,
    pub severity: Severity,
    pub message: String,
}

impl RequestStatus {
    pub fn ok(unit: Arc<InstallableUnit>, kind: RequestKind) -> Self {
        Self {
            unit,
            kind,
            severity: Severity::Ok,
            message: String::new(),
        }
    }

    pub fn warning(unit: Arc<InstallableUnit>, kind: RequestKind, message: impl Into<String>) -> Self {
        Self {
            unit,
            kind,
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn error(unit: Arc<InstallableUnit>, kind: RequestKind, message: impl Into<String>) -> Self {
        Self {
            unit,
            kind,
            severity: Severity::Error,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_escalation() {
        let mut status = PlanStatus::ok();
        assert!(status.is_ok());

        status.add_child(PlanStatus::warning("minor issue"));
        assert_eq!(status.severity, Severity::Warning);
        assert!(status.is_ok());

        status.add_child(PlanStatus::error("fatal issue"));
        assert_eq!(status.severity, Severity::Error);
        assert!(!status.is_ok());
    }

    #[test]
    fn test_warning_does_not_downgrade_error() {
        let mut status = PlanStatus::error("bad");
        status.add_child(PlanStatus::warning("also this"));
        assert_eq!(status.severity, Severity::Error);
    }

    #[test]
    fn test_describe_nests_children() {
        let mut status = PlanStatus::error("unresolvable request");
        status.add_child(PlanStatus::error("a 1.0.0 is missing a requirement"));
        let text = status.describe();
        assert!(text.contains("unresolvable request"));
        assert!(text.contains("  ERROR: a 1.0.0"));
    }
}
