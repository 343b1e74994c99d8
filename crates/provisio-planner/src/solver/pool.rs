use std::collections::HashMap;
use std::sync::Arc;

use provisio_version::Version;

use crate::metadata::{InstallableUnit, Requirement, UnitKey};

/// A unit decision in the solver. Positive literals mean "select the
/// unit", negative means "do not select".
pub type UnitId = i32;

/// The candidate units of one solve, indexed by id (1-based so that ids
/// double as SAT literals) with lookups by unit id and by capability.
pub struct Pool {
    /// Index 0 is a placeholder so unit ids start at 1.
    units: Vec<Arc<InstallableUnit>>,
    by_key: HashMap<UnitKey, UnitId>,
    by_unit_id: HashMap<String, Vec<UnitId>>,
    by_capability: HashMap<(String, String), Vec<UnitId>>,
}

impl Pool {
    pub fn new() -> Self {
        let placeholder = Arc::new(InstallableUnit::new("__placeholder__", Version::zero()));
        Self {
            units: vec![placeholder],
            by_key: HashMap::new(),
            by_unit_id: HashMap::new(),
            by_capability: HashMap::new(),
        }
    }

    /// Add a unit, returning its id. Adding the same identity twice
    /// returns the existing id.
    pub fn add_unit(&mut self, unit: Arc<InstallableUnit>) -> UnitId {
        if let Some(&existing) = self.by_key.get(&unit.key()) {
            return existing;
        }

        let id = self.units.len() as UnitId;
        self.by_key.insert(unit.key(), id);
        self.by_unit_id
            .entry(unit.id.clone())
            .or_default()
            .push(id);

        let self_cap = unit.self_capability();
        self.by_capability
            .entry((self_cap.namespace, self_cap.name))
            .or_default()
            .push(id);
        for cap in &unit.capabilities {
            self.by_capability
                .entry((cap.namespace.clone(), cap.name.clone()))
                .or_default()
                .push(id);
        }

        self.units.push(unit);
        id
    }

    pub fn unit(&self, id: UnitId) -> Option<&Arc<InstallableUnit>> {
        if id < 1 {
            return None;
        }
        self.units.get(id as usize)
    }

    pub fn id_of(&self, unit: &InstallableUnit) -> Option<UnitId> {
        self.by_key.get(&unit.key()).copied()
    }

    pub fn units_with_id(&self, unit_id: &str) -> &[UnitId] {
        self.by_unit_id
            .get(unit_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Units satisfying the requirement, in pool insertion order.
    pub fn providers_of(&self, requirement: &Requirement) -> Vec<UnitId> {
        let key = (requirement.namespace.clone(), requirement.name.clone());
        self.by_capability
            .get(&key)
            .into_iter()
            .flatten()
            .copied()
            .filter(|&id| {
                self.units[id as usize].provides(requirement)
            })
            .collect()
    }

    /// Number of units in the pool (excluding the placeholder).
    pub fn len(&self) -> usize {
        self.units.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> {
        1..=(self.len() as UnitId)
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool").field("units", &self.len()).finish()
    }
}
