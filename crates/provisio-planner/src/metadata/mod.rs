//! The installable-unit metadata model.
//!
//! Units are plain data: an identity, provided capabilities, requirements
//! on other capabilities, string properties and a handful of flags. They
//! are created from repository metadata, shared as `Arc<InstallableUnit>`
//! for the duration of one planning call, and never mutated after that.

mod patch;

pub use patch::{PatchInfo, RequirementChange};

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use provisio_version::{Version, VersionRange};

/// Namespace of the implicit self-capability every unit provides.
pub const UNIT_NAMESPACE: &str = "unit";

/// Identity of a unit: id plus version.
pub type UnitKey = (String, Version);

/// A capability provided by a unit: requirements are satisfied by matching
/// capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Capability {
    pub namespace: String,
    pub name: String,
    pub version: Version,
}

impl Capability {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            version,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.version)
    }
}

fn default_cardinality() -> u32 {
    1
}

fn default_greedy() -> bool {
    true
}

/// A requirement on a capability within a version range.
///
/// `min == 0` makes the requirement optional, `max == 0` turns it into a
/// prohibition (no matching capability may be selected). Greedy
/// requirements pull a satisfier into the plan when their owner is
/// selected; non-greedy ones only constrain what may be co-selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub namespace: String,
    pub name: String,
    #[serde(default = "VersionRange::any")]
    pub range: VersionRange,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default = "default_cardinality")]
    pub min: u32,
    #[serde(default = "default_cardinality")]
    pub max: u32,
    #[serde(default = "default_greedy")]
    pub greedy: bool,
}

impl Requirement {
    /// A mandatory, greedy requirement.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, range: VersionRange) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            range,
            filter: None,
            min: 1,
            max: 1,
            greedy: true,
        }
    }

    /// A mandatory, greedy requirement on another unit's self-capability.
    pub fn on_unit(id: impl Into<String>, range: VersionRange) -> Self {
        Self::new(UNIT_NAMESPACE, id, range)
    }

    /// A prohibition: no capability matching this may be selected.
    pub fn prohibition(
        namespace: impl Into<String>,
        name: impl Into<String>,
        range: VersionRange,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            range,
            filter: None,
            min: 0,
            max: 0,
            greedy: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.min = 0;
        self
    }

    pub fn non_greedy(mut self) -> Self {
        self.greedy = false;
        self
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn is_optional(&self) -> bool {
        self.min == 0
    }

    pub fn is_prohibition(&self) -> bool {
        self.max == 0
    }

    pub fn matches(&self, capability: &Capability) -> bool {
        self.namespace == capability.namespace
            && self.name == capability.name
            && self.range.includes(&capability.version)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} {}", self.namespace, self.name, self.range)
    }
}

/// Names the units this one is an update of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDescriptor {
    pub id: String,
    pub range: VersionRange,
}

impl UpdateDescriptor {
    pub fn new(id: impl Into<String>, range: VersionRange) -> Self {
        Self {
            id: id.into(),
            range,
        }
    }

    pub fn updates(&self, unit: &InstallableUnit) -> bool {
        self.id == unit.id && self.range.includes(&unit.version)
    }
}

/// A named, versioned, immutable unit of installable software metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallableUnit {
    pub id: String,
    pub version: Version,
    /// At most one version of a singleton id may be selected at once.
    #[serde(default)]
    pub singleton: bool,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub properties: IndexMap<String, String>,
    /// Applicability filter: the unit is only installable in environments
    /// this expression matches.
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub update_of: Option<UpdateDescriptor>,
    /// Touchpoint type and data are opaque to the planner; the engine
    /// interprets them when applying a plan.
    #[serde(default)]
    pub touchpoint_type: Option<String>,
    #[serde(default)]
    pub touchpoint_data: IndexMap<String, String>,
    #[serde(default)]
    pub patch: Option<PatchInfo>,
}

impl InstallableUnit {
    pub fn new(id: impl Into<String>, version: Version) -> Self {
        Self {
            id: id.into(),
            version,
            singleton: false,
            capabilities: Vec::new(),
            requirements: Vec::new(),
            properties: IndexMap::new(),
            filter: None,
            update_of: None,
            touchpoint_type: None,
            touchpoint_data: IndexMap::new(),
            patch: None,
        }
    }

    pub fn key(&self) -> UnitKey {
        (self.id.clone(), self.version.clone())
    }

    /// The implicit capability on the unit's own id and version.
    pub fn self_capability(&self) -> Capability {
        Capability::new(UNIT_NAMESPACE, self.id.clone(), self.version.clone())
    }

    /// Whether any capability of this unit (including the implicit
    /// self-capability) satisfies the requirement.
    pub fn provides(&self, requirement: &Requirement) -> bool {
        requirement.matches(&self.self_capability())
            || self.capabilities.iter().any(|c| requirement.matches(c))
    }

    pub fn is_patch(&self) -> bool {
        self.patch.is_some()
    }
}

impl fmt::Display for InstallableUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(major: u64, minor: u64, micro: u64) -> Version {
        Version::new(major, minor, micro)
    }

    #[test]
    fn test_self_capability_matches_unit_requirement() {
        let unit = InstallableUnit::new("com.example.a", v(1, 2, 0));
        let req = Requirement::on_unit("com.example.a", VersionRange::parse("[1.0.0,2.0.0)").unwrap());
        assert!(unit.provides(&req));

        let wrong_range =
            Requirement::on_unit("com.example.a", VersionRange::parse("[2.0.0,3.0.0)").unwrap());
        assert!(!unit.provides(&wrong_range));
    }

    #[test]
    fn test_named_capability_matching() {
        let mut unit = InstallableUnit::new("com.example.impl", v(1, 0, 0));
        unit.capabilities
            .push(Capability::new("service", "http", v(2, 1, 0)));

        let req = Requirement::new("service", "http", VersionRange::at_least(v(2, 0, 0)));
        assert!(unit.provides(&req));

        let other = Requirement::new("service", "ftp", VersionRange::any());
        assert!(!unit.provides(&other));
    }

    #[test]
    fn test_requirement_modes() {
        let req = Requirement::on_unit("a", VersionRange::any());
        assert!(!req.is_optional());
        assert!(req.greedy);

        let opt = req.clone().optional().non_greedy();
        assert!(opt.is_optional());
        assert!(!opt.greedy);

        let ban = Requirement::prohibition(UNIT_NAMESPACE, "a", VersionRange::any());
        assert!(ban.is_prohibition());
    }

    #[test]
    fn test_update_descriptor() {
        let old = InstallableUnit::new("com.example.a", v(1, 0, 0));
        let descriptor =
            UpdateDescriptor::new("com.example.a", VersionRange::parse("[1.0.0,2.0.0)").unwrap());
        assert!(descriptor.updates(&old));

        let unrelated = InstallableUnit::new("com.example.b", v(1, 0, 0));
        assert!(!descriptor.updates(&unrelated));
    }

    #[test]
    fn test_unit_deserializes_with_defaults() {
        let unit: InstallableUnit =
            serde_json::from_str(r#"{"id": "com.example.a", "version": "1.0.0"}"#).unwrap();
        assert_eq!(unit.id, "com.example.a");
        assert!(!unit.singleton);
        assert!(unit.requirements.is_empty());
        assert!(unit.patch.is_none());
    }

    #[test]
    fn test_requirement_deserializes_with_defaults() {
        let req: Requirement =
            serde_json::from_str(r#"{"namespace": "unit", "name": "com.example.b"}"#).unwrap();
        assert!(req.range.is_any());
        assert_eq!(req.min, 1);
        assert_eq!(req.max, 1);
        assert!(req.greedy);
    }
}
