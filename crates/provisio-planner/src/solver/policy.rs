use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use super::pool::{Pool, UnitId};

/// Candidate ordering for decisions.
///
/// When several units can satisfy a requirement the policy decides which
/// to try first: the version already installed in the profile (keeping the
/// current state minimizes the plan), then the highest version, then pool
/// insertion order as the deterministic tail. Candidates spanning several
/// ids are grouped and emitted in id order.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    installed: HashSet<UnitId>,
}

impl Policy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_installed(installed: impl IntoIterator<Item = UnitId>) -> Self {
        Self {
            installed: installed.into_iter().collect(),
        }
    }

    pub fn is_installed(&self, unit: UnitId) -> bool {
        self.installed.contains(&unit)
    }

    /// Sort candidates best-first.
    pub fn order_candidates(&self, pool: &Pool, candidates: &[UnitId]) -> Vec<UnitId> {
        if candidates.is_empty() {
            return Vec::new();
        }

        // Group by unit id; BTreeMap keeps cross-group order deterministic.
        let mut by_id: BTreeMap<String, Vec<UnitId>> = BTreeMap::new();
        for &candidate in candidates {
            if let Some(unit) = pool.unit(candidate) {
                by_id.entry(unit.id.clone()).or_default().push(candidate);
            }
        }

        for group in by_id.values_mut() {
            group.sort_by(|&a, &b| self.compare(pool, a, b));
        }

        by_id.into_values().flatten().collect()
    }

    fn compare(&self, pool: &Pool, a: UnitId, b: UnitId) -> Ordering {
        let a_installed = self.is_installed(a);
        let b_installed = self.is_installed(b);
        if a_installed != b_installed {
            return if a_installed {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }

        match (pool.unit(a), pool.unit(b)) {
            (Some(unit_a), Some(unit_b)) => unit_b
                .version
                .cmp(&unit_a.version) // Higher version first.
                .then(a.cmp(&b)),
            _ => a.cmp(&b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::InstallableUnit;
    use provisio_version::Version;
    use std::sync::Arc;

    fn v(major: u64, minor: u64, micro: u64) -> Version {
        Version::new(major, minor, micro)
    }

    #[test]
    fn test_highest_version_first() {
        let mut pool = Pool::new();
        let b1 = pool.add_unit(Arc::new(InstallableUnit::new("b", v(1, 0, 0))));
        let b2 = pool.add_unit(Arc::new(InstallableUnit::new("b", v(1, 1, 0))));

        let policy = Policy::new();
        assert_eq!(policy.order_candidates(&pool, &[b1, b2]), vec![b2, b1]);
    }

    #[test]
    fn test_installed_version_preferred() {
        let mut pool = Pool::new();
        let b1 = pool.add_unit(Arc::new(InstallableUnit::new("b", v(1, 0, 0))));
        let b2 = pool.add_unit(Arc::new(InstallableUnit::new("b", v(1, 1, 0))));

        let policy = Policy::with_installed([b1]);
        assert_eq!(policy.order_candidates(&pool, &[b1, b2]), vec![b1, b2]);
    }

    #[test]
    fn test_groups_ordered_by_id() {
        let mut pool = Pool::new();
        let z = pool.add_unit(Arc::new(InstallableUnit::new("z", v(1, 0, 0))));
        let a = pool.add_unit(Arc::new(InstallableUnit::new("a", v(1, 0, 0))));

        let policy = Policy::new();
        assert_eq!(policy.order_candidates(&pool, &[z, a]), vec![a, z]);
    }
}
