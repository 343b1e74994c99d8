//! Profile change requests.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::metadata::{InstallableUnit, Requirement, UnitKey};

/// How a top-level unit is pinned during the solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionRule {
    /// The unit must be exactly in the requested state or the plan fails.
    Strict,
    /// Best effort: the solver may drop the unit to keep the rest
    /// satisfiable.
    Optional,
}

/// What should change in a profile: units to add and remove, inclusion
/// rule overrides, property edits and extra requirements injected into the
/// solve without belonging to any particular unit.
///
/// Builder methods chain on `&mut Self`; the request stays plain data and
/// is only interpreted by the planner.
#[derive(Debug, Clone, Default)]
pub struct ProfileChangeRequest {
    pub additions: Vec<Arc<InstallableUnit>>,
    pub removals: Vec<Arc<InstallableUnit>>,
    inclusion_rules: HashMap<UnitKey, InclusionRule>,
    /// Per-unit property edits; `None` removes the key.
    unit_properties: HashMap<UnitKey, IndexMap<String, Option<String>>>,
    /// Profile-level property edits; `None` removes the key.
    profile_properties: IndexMap<String, Option<String>>,
    pub extra_requirements: Vec<Requirement>,
}

impl ProfileChangeRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, unit: Arc<InstallableUnit>) -> &mut Self {
        if !self.additions.iter().any(|u| u.key() == unit.key()) {
            self.additions.push(unit);
        }
        self
    }

    pub fn remove(&mut self, unit: Arc<InstallableUnit>) -> &mut Self {
        if !self.removals.iter().any(|u| u.key() == unit.key()) {
            self.removals.push(unit);
        }
        self
    }

    pub fn set_inclusion_rule(&mut self, unit: &InstallableUnit, rule: InclusionRule) -> &mut Self {
        self.inclusion_rules.insert(unit.key(), rule);
        self
    }

    pub fn inclusion_rule(&self, unit: &InstallableUnit) -> Option<InclusionRule> {
        self.inclusion_rules.get(&unit.key()).copied()
    }

    pub fn set_unit_property(
        &mut self,
        unit: &InstallableUnit,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.unit_properties
            .entry(unit.key())
            .or_default()
            .insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_unit_property(
        &mut self,
        unit: &InstallableUnit,
        key: impl Into<String>,
    ) -> &mut Self {
        self.unit_properties
            .entry(unit.key())
            .or_default()
            .insert(key.into(), None);
        self
    }

    pub fn set_profile_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &mut Self {
        self.profile_properties.insert(key.into(), Some(value.into()));
        self
    }

    pub fn remove_profile_property(&mut self, key: impl Into<String>) -> &mut Self {
        self.profile_properties.insert(key.into(), None);
        self
    }

    /// Inject an additional constraint into the solve, not tied to any
    /// added unit.
    pub fn add_extra_requirement(&mut self, requirement: Requirement) -> &mut Self {
        self.extra_requirements.push(requirement);
        self
    }

    pub fn unit_property_changes(
        &self,
    ) -> impl Iterator<Item = (&UnitKey, &IndexMap<String, Option<String>>)> {
        self.unit_properties.iter()
    }

    pub fn profile_property_changes(&self) -> impl Iterator<Item = (&String, &Option<String>)> {
        self.profile_properties.iter()
    }

    pub fn is_removal(&self, unit: &InstallableUnit) -> bool {
        self.removals.iter().any(|u| u.key() == unit.key())
    }

    pub fn is_addition(&self, unit: &InstallableUnit) -> bool {
        self.additions.iter().any(|u| u.key() == unit.key())
    }

    /// Additions that are not also removed by the same request. An
    /// add-then-remove of the same unit cancels out.
    pub fn effective_additions(&self) -> Vec<Arc<InstallableUnit>> {
        self.additions
            .iter()
            .filter(|u| !self.is_removal(u))
            .cloned()
            .collect()
    }

    /// Removals that are not also added by the same request.
    pub fn effective_removals(&self) -> Vec<Arc<InstallableUnit>> {
        self.removals
            .iter()
            .filter(|u| !self.is_addition(u))
            .cloned()
            .collect()
    }
}
