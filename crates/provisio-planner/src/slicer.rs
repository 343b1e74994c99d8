//! Computes the bounded candidate universe for one planning call.
//!
//! Starting from the seed units (the profile's current content plus the
//! requested additions) the slicer walks requirements to every capability
//! provider that could possibly matter for the solve, including providers
//! of non-greedy requirements, which constrain satisfiability even though
//! they are never auto-installed. Units whose applicability filter fails
//! against the environment are excluded up front but remembered, so a
//! later "no provider" failure can be reported as *filtered* rather than
//! *missing*.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::filter::Environment;
use crate::metadata::{InstallableUnit, Requirement, UnitKey};
use crate::monitor::Monitor;
use crate::status::PlanStatus;

/// The sliced universe: admitted units in discovery order, plus the units
/// that were excluded by their applicability filter.
#[derive(Debug)]
pub struct Slice {
    units: Vec<Arc<InstallableUnit>>,
    capability_index: HashMap<(String, String), Vec<usize>>,
    filtered: Vec<Arc<InstallableUnit>>,
    pub status: PlanStatus,
}

impl Slice {
    pub fn units(&self) -> &[Arc<InstallableUnit>] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, unit: &InstallableUnit) -> bool {
        self.units
            .iter()
            .any(|u| u.id == unit.id && u.version == unit.version)
    }

    /// Units in the slice satisfying the requirement, in discovery order.
    pub fn providers_of(&self, requirement: &Requirement) -> Vec<Arc<InstallableUnit>> {
        let key = (requirement.namespace.clone(), requirement.name.clone());
        self.capability_index
            .get(&key)
            .into_iter()
            .flatten()
            .map(|&idx| &self.units[idx])
            .filter(|u| u.provides(requirement))
            .cloned()
            .collect()
    }

    /// Filtered-out units that would have satisfied the requirement had
    /// their applicability filter passed.
    pub fn filtered_providers_of(&self, requirement: &Requirement) -> Vec<Arc<InstallableUnit>> {
        self.filtered
            .iter()
            .filter(|u| u.provides(requirement))
            .cloned()
            .collect()
    }

    pub fn was_filtered(&self, unit: &InstallableUnit) -> bool {
        self.filtered
            .iter()
            .any(|u| u.id == unit.id && u.version == unit.version)
    }
}

pub struct Slicer<'a> {
    universe: Vec<Arc<InstallableUnit>>,
    env: &'a Environment,
}

impl<'a> Slicer<'a> {
    pub fn new(universe: Vec<Arc<InstallableUnit>>, env: &'a Environment) -> Self {
        Self { universe, env }
    }

    /// Compute the closure of the seeds under requirement satisfaction.
    ///
    /// Non-fatal metadata issues (malformed filters, broken cardinalities)
    /// exclude the offending unit and accumulate WARNING statuses; the
    /// slice itself is still produced. Cancellation yields a partial slice
    /// with a CANCEL status.
    pub fn slice(
        &self,
        seeds: &[Arc<InstallableUnit>],
        extra_requirements: &[Requirement],
        monitor: &dyn Monitor,
    ) -> Slice {
        let mut status = PlanStatus::ok();

        // Admit the universe: applicability filters and metadata sanity.
        let mut admitted: Vec<Arc<InstallableUnit>> = Vec::new();
        let mut filtered: Vec<Arc<InstallableUnit>> = Vec::new();
        let mut admitted_index: HashMap<(String, String), Vec<usize>> = HashMap::new();
        let mut key_to_admitted: HashMap<UnitKey, usize> = HashMap::new();

        for unit in &self.universe {
            match self.env.unit_passes(unit) {
                Ok(true) => {}
                Ok(false) => {
                    filtered.push(unit.clone());
                    continue;
                }
                Err(err) => {
                    status.add_child(PlanStatus::warning(format!(
                        "unit {unit} has a malformed filter ({err}); treating it as not applicable"
                    )));
                    filtered.push(unit.clone());
                    continue;
                }
            }

            if unit
                .requirements
                .iter()
                .any(|r| r.max != 0 && r.min > r.max)
            {
                status.add_child(PlanStatus::warning(format!(
                    "unit {unit} declares an impossible requirement cardinality; excluding it"
                )));
                continue;
            }

            let idx = admitted.len();
            key_to_admitted.insert(unit.key(), idx);
            let self_cap = unit.self_capability();
            admitted_index
                .entry((self_cap.namespace, self_cap.name))
                .or_default()
                .push(idx);
            for cap in &unit.capabilities {
                admitted_index
                    .entry((cap.namespace.clone(), cap.name.clone()))
                    .or_default()
                    .push(idx);
            }
            admitted.push(unit.clone());
        }

        // Closure from the seeds and the request's extra requirements.
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut visited: HashSet<usize> = HashSet::new();
        let mut selected: Vec<usize> = Vec::new();

        let mut enqueue = |idx: usize,
                           queue: &mut VecDeque<usize>,
                           visited: &mut HashSet<usize>,
                           selected: &mut Vec<usize>| {
            if visited.insert(idx) {
                selected.push(idx);
                queue.push_back(idx);
            }
        };

        for seed in seeds {
            if let Some(&idx) = key_to_admitted.get(&seed.key()) {
                enqueue(idx, &mut queue, &mut visited, &mut selected);
            }
        }
        for requirement in extra_requirements {
            if requirement.is_prohibition() {
                continue;
            }
            match self.env.requirement_active(requirement) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    status.add_child(PlanStatus::warning(format!(
                        "extra requirement {requirement} has a malformed filter ({err}); \
                         treating it as inactive"
                    )));
                    continue;
                }
            }
            for idx in providers_in(&admitted, &admitted_index, requirement) {
                enqueue(idx, &mut queue, &mut visited, &mut selected);
            }
        }

        while let Some(current) = queue.pop_front() {
            if monitor.is_cancelled() {
                status.add_child(PlanStatus::cancel());
                return self.finish(admitted, selected, filtered, status);
            }

            let unit = admitted[current].clone();
            for requirement in self.effective_requirements(&unit) {
                if requirement.is_prohibition() {
                    // Prohibitions never pull anything into the slice.
                    continue;
                }
                match self.env.requirement_active(&requirement) {
                    Ok(true) => {}
                    Ok(false) => continue,
                    Err(err) => {
                        status.add_child(PlanStatus::warning(format!(
                            "requirement {requirement} of {unit} has a malformed filter ({err}); \
                             treating it as inactive"
                        )));
                        continue;
                    }
                }

                for idx in providers_in(&admitted, &admitted_index, &requirement) {
                    enqueue(idx, &mut queue, &mut visited, &mut selected);
                }
            }
        }

        self.finish(admitted, selected, filtered, status)
    }

    /// A unit's requirements plus, for patches, the replacement
    /// requirements and the lifecycle requirement: their providers must
    /// be in the slice for the rewrite clauses to mean anything.
    fn effective_requirements(&self, unit: &InstallableUnit) -> Vec<Requirement> {
        let mut requirements = unit.requirements.clone();
        if let Some(patch) = &unit.patch {
            for change in &patch.changes {
                requirements.push(change.to.clone());
            }
            if let Some(lifecycle) = &patch.lifecycle {
                requirements.push(lifecycle.clone());
            }
        }
        requirements
    }

    fn finish(
        &self,
        admitted: Vec<Arc<InstallableUnit>>,
        selected: Vec<usize>,
        filtered: Vec<Arc<InstallableUnit>>,
        status: PlanStatus,
    ) -> Slice {
        let units: Vec<Arc<InstallableUnit>> = selected
            .iter()
            .map(|&idx| admitted[idx].clone())
            .collect();

        let mut capability_index: HashMap<(String, String), Vec<usize>> = HashMap::new();
        for (idx, unit) in units.iter().enumerate() {
            let self_cap = unit.self_capability();
            capability_index
                .entry((self_cap.namespace, self_cap.name))
                .or_default()
                .push(idx);
            for cap in &unit.capabilities {
                capability_index
                    .entry((cap.namespace.clone(), cap.name.clone()))
                    .or_default()
                    .push(idx);
            }
        }

        log::debug!(
            "sliced {} of {} candidate units ({} filtered by environment)",
            units.len(),
            self.universe.len(),
            filtered.len()
        );

        Slice {
            units,
            capability_index,
            filtered,
            status,
        }
    }
}

fn providers_in(
    admitted: &[Arc<InstallableUnit>],
    index: &HashMap<(String, String), Vec<usize>>,
    requirement: &Requirement,
) -> Vec<usize> {
    let key = (requirement.namespace.clone(), requirement.name.clone());
    index
        .get(&key)
        .into_iter()
        .flatten()
        .copied()
        .filter(|&idx| admitted[idx].provides(requirement))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PatchInfo, RequirementChange};
    use crate::monitor::{CancelFlag, NullMonitor};
    use indexmap::IndexMap;
    use provisio_version::{Version, VersionRange};

    fn v(major: u64, minor: u64, micro: u64) -> Version {
        Version::new(major, minor, micro)
    }

    fn unit(id: &str, version: Version) -> InstallableUnit {
        InstallableUnit::new(id, version)
    }

    fn env(pairs: &[(&str, &str)]) -> Environment {
        Environment::new(
            pairs
                .iter()
                .map(|(k, val)| (k.to_string(), val.to_string()))
                .collect::<IndexMap<_, _>>(),
        )
    }

    #[test]
    fn test_closure_follows_requirements() {
        let mut a = unit("a", v(1, 0, 0));
        a.requirements
            .push(Requirement::on_unit("b", VersionRange::any()));
        let b = unit("b", v(1, 0, 0));
        let c = unit("c", v(1, 0, 0)); // Unreachable.

        let environment = env(&[]);
        let universe: Vec<_> = [a.clone(), b, c].into_iter().map(Arc::new).collect();
        let slicer = Slicer::new(universe, &environment);

        let slice = slicer.slice(&[Arc::new(a)], &[], &NullMonitor);
        let ids: Vec<&str> = slice.units().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_non_greedy_providers_are_included() {
        let mut a = unit("a", v(1, 0, 0));
        a.requirements
            .push(Requirement::on_unit("b", VersionRange::any()).non_greedy());
        let b = unit("b", v(1, 0, 0));

        let environment = env(&[]);
        let slicer = Slicer::new(
            [a.clone(), b].into_iter().map(Arc::new).collect(),
            &environment,
        );

        let slice = slicer.slice(&[Arc::new(a)], &[], &NullMonitor);
        assert_eq!(slice.len(), 2);
    }

    #[test]
    fn test_unit_filter_prunes() {
        let mut a = unit("a", v(1, 0, 0));
        a.requirements
            .push(Requirement::on_unit("b", VersionRange::any()));
        let mut b = unit("b", v(1, 0, 0));
        b.filter = Some("(os=win32)".to_string());

        let environment = env(&[("os", "linux")]);
        let slicer = Slicer::new(
            [a.clone(), b].into_iter().map(Arc::new).collect(),
            &environment,
        );

        let slice = slicer.slice(&[Arc::new(a)], &[], &NullMonitor);
        assert_eq!(slice.len(), 1);

        let req = Requirement::on_unit("b", VersionRange::any());
        assert!(slice.providers_of(&req).is_empty());
        assert_eq!(slice.filtered_providers_of(&req).len(), 1);
    }

    #[test]
    fn test_requirement_filter_prunes_expansion() {
        let mut a = unit("a", v(1, 0, 0));
        a.requirements.push(
            Requirement::on_unit("b", VersionRange::any()).with_filter("(os=win32)"),
        );
        let b = unit("b", v(1, 0, 0));

        let environment = env(&[("os", "linux")]);
        let slicer = Slicer::new(
            [a.clone(), b].into_iter().map(Arc::new).collect(),
            &environment,
        );

        let slice = slicer.slice(&[Arc::new(a)], &[], &NullMonitor);
        let ids: Vec<&str> = slice.units().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a"]);
    }

    #[test]
    fn test_malformed_filter_warns_and_excludes() {
        let mut a = unit("a", v(1, 0, 0));
        a.filter = Some("(os=linux".to_string());

        let environment = env(&[("os", "linux")]);
        let slicer = Slicer::new(vec![Arc::new(a.clone())], &environment);

        let slice = slicer.slice(&[Arc::new(a)], &[], &NullMonitor);
        assert!(slice.is_empty());
        assert_eq!(slice.status.severity, crate::status::Severity::Warning);
    }

    #[test]
    fn test_extra_requirements_expand() {
        let a = unit("a", v(1, 0, 0));
        let b = unit("b", v(1, 0, 0));

        let environment = env(&[]);
        let slicer = Slicer::new(
            [a, b].into_iter().map(Arc::new).collect(),
            &environment,
        );

        let extra = [Requirement::on_unit("b", VersionRange::any())];
        let slice = slicer.slice(&[], &extra, &NullMonitor);
        let ids: Vec<&str> = slice.units().iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["b"]);
    }

    #[test]
    fn test_patch_replacement_providers_are_pulled() {
        let mut a = unit("a", v(1, 0, 0));
        a.requirements.push(Requirement::on_unit(
            "b",
            VersionRange::parse("[1.0.0,2.0.0)").unwrap(),
        ));
        let b1 = unit("b", v(1, 0, 0));
        let b3 = unit("b", v(3, 0, 0)); // Only reachable through the patch.

        let mut patch = unit("b.hotfix", v(1, 0, 0));
        patch.patch = Some(PatchInfo {
            changes: vec![RequirementChange::new(
                Requirement::on_unit("b", VersionRange::any()),
                Requirement::on_unit("b", VersionRange::parse("[3.0.0,4.0.0)").unwrap()),
            )],
            lifecycle: None,
            scopes: Vec::new(),
        });

        let environment = env(&[]);
        let slicer = Slicer::new(
            [a.clone(), b1, b3, patch.clone()]
                .into_iter()
                .map(Arc::new)
                .collect(),
            &environment,
        );

        let slice = slicer.slice(
            &[Arc::new(a), Arc::new(patch)],
            &[],
            &NullMonitor,
        );
        let ids: Vec<(String, u64)> = slice
            .units()
            .iter()
            .map(|u| (u.id.clone(), u.version.major))
            .collect();
        assert!(ids.contains(&("b".to_string(), 3)));
    }

    #[test]
    fn test_cancellation_yields_cancel_status() {
        let a = unit("a", v(1, 0, 0));
        let environment = env(&[]);
        let slicer = Slicer::new(vec![Arc::new(a.clone())], &environment);

        let flag = CancelFlag::new();
        flag.cancel();
        let slice = slicer.slice(&[Arc::new(a)], &[], &flag);
        assert!(slice.status.is_cancelled());
    }
}
