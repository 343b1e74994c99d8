//! Read-only profile snapshots.
//!
//! A profile records what is currently installed: units, per-unit string
//! properties and profile-level properties. The planner only ever reads a
//! profile; mutation happens in the engine when it applies a plan's
//! operands, which is outside this crate.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::metadata::{InstallableUnit, UnitKey};

/// Per-unit property naming how the unit is pinned: `strict` units must
/// stay exactly as installed, `optional` units are kept best-effort.
pub const PROP_INCLUSION_RULE: &str = "inclusion.rule";
pub const INCLUSION_STRICT: &str = "strict";
pub const INCLUSION_OPTIONAL: &str = "optional";

/// Per-unit property marking units that belong to a shared base install;
/// the request flexer never relaxes these.
pub const PROP_SHARED_BASE: &str = "shared.base";

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub id: String,
    units: Vec<Arc<InstallableUnit>>,
    unit_properties: HashMap<UnitKey, IndexMap<String, String>>,
    pub properties: IndexMap<String, String>,
}

impl Profile {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            units: Vec::new(),
            unit_properties: HashMap::new(),
            properties: IndexMap::new(),
        }
    }

    pub fn add_unit(&mut self, unit: Arc<InstallableUnit>) {
        if !self.contains(&unit) {
            self.units.push(unit);
        }
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn set_unit_property(
        &mut self,
        unit: &InstallableUnit,
        key: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.unit_properties
            .entry(unit.key())
            .or_default()
            .insert(key.into(), value.into());
    }

    pub fn units(&self) -> &[Arc<InstallableUnit>] {
        &self.units
    }

    pub fn contains(&self, unit: &InstallableUnit) -> bool {
        self.units
            .iter()
            .any(|u| u.id == unit.id && u.version == unit.version)
    }

    pub fn unit_property(&self, unit: &InstallableUnit, key: &str) -> Option<&str> {
        self.unit_properties
            .get(&unit.key())
            .and_then(|props| props.get(key))
            .map(String::as_str)
    }

    pub fn unit_properties(&self, unit: &InstallableUnit) -> Option<&IndexMap<String, String>> {
        self.unit_properties.get(&unit.key())
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Whether the unit is pinned strictly (the default when no inclusion
    /// rule property is present).
    pub fn is_strict(&self, unit: &InstallableUnit) -> bool {
        self.unit_property(unit, PROP_INCLUSION_RULE)
            .map(|rule| rule != INCLUSION_OPTIONAL)
            .unwrap_or(true)
    }

    /// Whether the unit belongs to the immutable shared base.
    pub fn is_shared(&self, unit: &InstallableUnit) -> bool {
        self.unit_property(unit, PROP_SHARED_BASE) == Some("true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_version::Version;

    fn unit(id: &str, major: u64) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::new(id, Version::new(major, 0, 0)))
    }

    #[test]
    fn test_add_and_contains() {
        let mut profile = Profile::new("default");
        let a = unit("a", 1);
        profile.add_unit(a.clone());
        profile.add_unit(a.clone()); // Duplicate add is a no-op.

        assert_eq!(profile.len(), 1);
        assert!(profile.contains(&a));
        assert!(!profile.contains(&unit("b", 1)));
    }

    #[test]
    fn test_unit_properties() {
        let mut profile = Profile::new("default");
        let a = unit("a", 1);
        profile.add_unit(a.clone());
        profile.set_unit_property(&a, PROP_INCLUSION_RULE, INCLUSION_OPTIONAL);

        assert_eq!(
            profile.unit_property(&a, PROP_INCLUSION_RULE),
            Some(INCLUSION_OPTIONAL)
        );
        assert!(!profile.is_strict(&a));
    }

    #[test]
    fn test_strict_by_default() {
        let mut profile = Profile::new("default");
        let a = unit("a", 1);
        profile.add_unit(a.clone());
        assert!(profile.is_strict(&a));
        assert!(!profile.is_shared(&a));
    }

    #[test]
    fn test_shared_base_marker() {
        let mut profile = Profile::new("default");
        let a = unit("a", 1);
        profile.add_unit(a.clone());
        profile.set_unit_property(&a, PROP_SHARED_BASE, "true");
        assert!(profile.is_shared(&a));
    }
}
