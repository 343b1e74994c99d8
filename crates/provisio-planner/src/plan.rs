//! Provisioning plans: the computed diff between the current and the
//! target profile state.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::explanation::Explanation;
use crate::metadata::{InstallableUnit, UnitKey};
use crate::status::{PlanStatus, RequestStatus};

/// The atomic diff unit an engine executes.
#[derive(Debug, Clone)]
pub enum Operand {
    Install(Arc<InstallableUnit>),
    Uninstall(Arc<InstallableUnit>),
    Update {
        from: Arc<InstallableUnit>,
        to: Arc<InstallableUnit>,
    },
    /// `None` value removes the key.
    SetUnitProperty {
        unit: Arc<InstallableUnit>,
        key: String,
        value: Option<String>,
    },
    SetProfileProperty {
        key: String,
        value: Option<String>,
    },
}

/// The result of a planning call. Always a fully formed value: a failing
/// plan carries its status and explanations instead of panicking or
/// erroring out.
#[derive(Debug)]
pub struct ProvisioningPlan {
    pub status: PlanStatus,
    pub operands: Vec<Operand>,
    pub explanations: Vec<Explanation>,
    pub request_statuses: Vec<RequestStatus>,
    /// On failure: the minimal set of top-level units that cannot be
    /// satisfied together.
    pub uninstallable_roots: Vec<Arc<InstallableUnit>>,
    /// On success: the complete future profile content.
    pub future_state: Vec<Arc<InstallableUnit>>,
}

impl ProvisioningPlan {
    pub fn with_status(status: PlanStatus) -> Self {
        Self {
            status,
            operands: Vec::new(),
            explanations: Vec::new(),
            request_statuses: Vec::new(),
            uninstallable_roots: Vec::new(),
            future_state: Vec::new(),
        }
    }

    pub fn cancelled() -> Self {
        Self::with_status(PlanStatus::cancel())
    }

    /// Units this plan brings in (installs and update targets).
    pub fn additions(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.operands.iter().filter_map(|op| match op {
            Operand::Install(unit) => Some(unit),
            Operand::Update { to, .. } => Some(to),
            _ => None,
        })
    }

    /// Units this plan takes out (uninstalls and update sources).
    pub fn removals(&self) -> impl Iterator<Item = &Arc<InstallableUnit>> {
        self.operands.iter().filter_map(|op| match op {
            Operand::Uninstall(unit) => Some(unit),
            Operand::Update { from, .. } => Some(from),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for operand in &self.operands {
            match operand {
                Operand::Install(_) => summary.installs += 1,
                Operand::Update { .. } => summary.updates += 1,
                Operand::Uninstall(_) => summary.uninstalls += 1,
                Operand::SetUnitProperty { .. } | Operand::SetProfileProperty { .. } => {
                    summary.property_changes += 1
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub installs: usize,
    pub updates: usize,
    pub uninstalls: usize,
    pub property_changes: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.installs > 0 {
            parts.push(format!("{} install(s)", self.installs));
        }
        if self.updates > 0 {
            parts.push(format!("{} update(s)", self.updates));
        }
        if self.uninstalls > 0 {
            parts.push(format!("{} removal(s)", self.uninstalls));
        }
        if self.property_changes > 0 {
            parts.push(format!("{} property change(s)", self.property_changes));
        }

        if parts.is_empty() {
            write!(f, "Nothing to do")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Structural diff between two unit sets.
///
/// Units present only in the old state become uninstalls, only in the new
/// state installs. An added unit whose update descriptor names a removed
/// unit (or that shares its id with one) pairs into an update operand
/// instead. Uninstalls are ordered first so an applying engine never holds
/// two versions of a singleton id at once, then updates, then installs,
/// each sorted by unit id and version.
pub fn diff_states(
    old: &[Arc<InstallableUnit>],
    new: &[Arc<InstallableUnit>],
) -> Vec<Operand> {
    let old_keys: HashSet<UnitKey> = old.iter().map(|u| u.key()).collect();
    let new_keys: HashSet<UnitKey> = new.iter().map(|u| u.key()).collect();

    let mut removed: Vec<Option<Arc<InstallableUnit>>> = old
        .iter()
        .filter(|u| !new_keys.contains(&u.key()))
        .cloned()
        .map(Some)
        .collect();
    removed.sort_by(|a, b| {
        a.as_ref()
            .map(|u| u.key())
            .cmp(&b.as_ref().map(|u| u.key()))
    });

    let mut added: Vec<Arc<InstallableUnit>> = new
        .iter()
        .filter(|u| !old_keys.contains(&u.key()))
        .cloned()
        .collect();
    added.sort_by_key(|u| u.key());

    let mut updates: Vec<(Arc<InstallableUnit>, Arc<InstallableUnit>)> = Vec::new();
    let mut installs: Vec<Arc<InstallableUnit>> = Vec::new();

    for unit in added {
        // An explicit update descriptor wins over the same-id heuristic.
        let descriptor_match = removed.iter().position(|slot| {
            slot.as_ref().is_some_and(|old_unit| {
                unit.update_of
                    .as_ref()
                    .is_some_and(|d| d.updates(old_unit))
            })
        });
        let position = descriptor_match.or_else(|| {
            removed
                .iter()
                .position(|slot| slot.as_ref().is_some_and(|old_unit| old_unit.id == unit.id))
        });

        match position {
            Some(idx) => {
                let from = removed[idx].take().expect("position found a filled slot");
                updates.push((from, unit));
            }
            None => installs.push(unit),
        }
    }

    let mut operands = Vec::new();
    for slot in removed.into_iter().flatten() {
        operands.push(Operand::Uninstall(slot));
    }
    for (from, to) in updates {
        operands.push(Operand::Update { from, to });
    }
    for unit in installs {
        operands.push(Operand::Install(unit));
    }
    operands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::UpdateDescriptor;
    use provisio_version::{Version, VersionRange};

    fn v(major: u64, minor: u64, micro: u64) -> Version {
        Version::new(major, minor, micro)
    }

    fn unit(id: &str, version: Version) -> Arc<InstallableUnit> {
        Arc::new(InstallableUnit::new(id, version))
    }

    #[test]
    fn test_no_change_is_empty() {
        let a = unit("a", v(1, 0, 0));
        let operands = diff_states(&[a.clone()], &[a]);
        assert!(operands.is_empty());
    }

    #[test]
    fn test_install_and_uninstall() {
        let a = unit("a", v(1, 0, 0));
        let b = unit("b", v(1, 0, 0));
        let operands = diff_states(&[a.clone()], &[b.clone()]);

        assert_eq!(operands.len(), 2);
        assert!(matches!(&operands[0], Operand::Uninstall(u) if u.id == "a"));
        assert!(matches!(&operands[1], Operand::Install(u) if u.id == "b"));
    }

    #[test]
    fn test_same_id_pairs_into_update() {
        let a1 = unit("a", v(1, 0, 0));
        let a2 = unit("a", v(2, 0, 0));
        let operands = diff_states(&[a1], &[a2]);

        assert_eq!(operands.len(), 1);
        assert!(matches!(
            &operands[0],
            Operand::Update { from, to }
                if from.version == v(1, 0, 0) && to.version == v(2, 0, 0)
        ));
    }

    #[test]
    fn test_update_descriptor_pairs_across_ids() {
        let old = unit("com.example.legacy", v(1, 0, 0));
        let mut replacement = InstallableUnit::new("com.example.modern", v(1, 0, 0));
        replacement.update_of = Some(UpdateDescriptor::new(
            "com.example.legacy",
            VersionRange::any(),
        ));
        let replacement = Arc::new(replacement);

        let operands = diff_states(&[old], &[replacement]);
        assert_eq!(operands.len(), 1);
        assert!(matches!(
            &operands[0],
            Operand::Update { from, to }
                if from.id == "com.example.legacy" && to.id == "com.example.modern"
        ));
    }

    #[test]
    fn test_uninstalls_come_first() {
        let old_only = unit("z-old", v(1, 0, 0));
        let new_only = unit("a-new", v(1, 0, 0));
        let operands = diff_states(&[old_only], &[new_only]);

        assert!(matches!(&operands[0], Operand::Uninstall(_)));
        assert!(matches!(&operands[1], Operand::Install(_)));
    }

    #[test]
    fn test_operands_sorted_by_id() {
        let b = unit("b", v(1, 0, 0));
        let a = unit("a", v(1, 0, 0));
        let operands = diff_states(&[], &[b, a]);

        let ids: Vec<&str> = operands
            .iter()
            .filter_map(|op| match op {
                Operand::Install(u) => Some(u.id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_summary_display() {
        let plan = ProvisioningPlan {
            status: PlanStatus::ok(),
            operands: diff_states(&[unit("a", v(1, 0, 0))], &[unit("b", v(1, 0, 0))]),
            explanations: Vec::new(),
            request_statuses: Vec::new(),
            uninstallable_roots: Vec::new(),
            future_state: Vec::new(),
        };
        assert_eq!(plan.summary().to_string(), "1 install(s), 1 removal(s)");

        let empty = ProvisioningPlan::with_status(PlanStatus::ok());
        assert_eq!(empty.summary().to_string(), "Nothing to do");
    }
}
