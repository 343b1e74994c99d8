use serde::{Deserialize, Serialize};

use super::{InstallableUnit, Requirement};

/// A rewrite rule carried by a patch unit: requirements matching `from`
/// (by namespace and name) are replaced by `to` while the patch is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementChange {
    pub from: Requirement,
    pub to: Requirement,
}

impl RequirementChange {
    pub fn new(from: Requirement, to: Requirement) -> Self {
        Self { from, to }
    }

    /// Whether this change rewrites the given requirement. Matching is by
    /// namespace and name; the pattern's range plays no role.
    pub fn applies_to(&self, requirement: &Requirement) -> bool {
        self.from.namespace == requirement.namespace && self.from.name == requirement.name
    }
}

/// Patch-specific metadata on a unit.
///
/// A patch conditionally rewrites requirements of other units. It only
/// applies to units matching one of its scope requirement-sets, and only
/// while its lifecycle requirement is satisfied by the solution. An empty
/// scope list means the patch applies to every unit in the slice.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatchInfo {
    #[serde(default)]
    pub changes: Vec<RequirementChange>,
    #[serde(default)]
    pub lifecycle: Option<Requirement>,
    #[serde(default)]
    pub scopes: Vec<Vec<Requirement>>,
}

impl PatchInfo {
    /// Whether the patch's scope covers the given unit: some scope set is
    /// fully satisfied by the unit's capabilities, or no scope is given.
    pub fn in_scope(&self, unit: &InstallableUnit) -> bool {
        self.scopes.is_empty()
            || self
                .scopes
                .iter()
                .any(|set| set.iter().all(|req| unit.provides(req)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_version::{Version, VersionRange};

    fn v(major: u64, minor: u64, micro: u64) -> Version {
        Version::new(major, minor, micro)
    }

    #[test]
    fn test_change_matches_by_namespace_and_name() {
        let change = RequirementChange::new(
            Requirement::on_unit("com.example.b", VersionRange::parse("[1.0.0,2.0.0)").unwrap()),
            Requirement::on_unit("com.example.b", VersionRange::parse("[1.0.0,3.0.0)").unwrap()),
        );

        let narrow =
            Requirement::on_unit("com.example.b", VersionRange::parse("[1.0.0,1.5.0)").unwrap());
        assert!(change.applies_to(&narrow));

        let other = Requirement::on_unit("com.example.c", VersionRange::any());
        assert!(!change.applies_to(&other));
    }

    #[test]
    fn test_scope_matching() {
        let patch = PatchInfo {
            changes: Vec::new(),
            lifecycle: None,
            scopes: vec![vec![Requirement::on_unit(
                "com.example.app",
                VersionRange::parse("[1.0.0,2.0.0)").unwrap(),
            )]],
        };

        let in_scope = InstallableUnit::new("com.example.app", v(1, 1, 0));
        let out_of_scope = InstallableUnit::new("com.example.app", v(2, 0, 0));
        let unrelated = InstallableUnit::new("com.example.lib", v(1, 1, 0));

        assert!(patch.in_scope(&in_scope));
        assert!(!patch.in_scope(&out_of_scope));
        assert!(!patch.in_scope(&unrelated));
    }

    #[test]
    fn test_empty_scope_covers_everything() {
        let patch = PatchInfo::default();
        let unit = InstallableUnit::new("anything", v(1, 0, 0));
        assert!(patch.in_scope(&unit));
    }
}
