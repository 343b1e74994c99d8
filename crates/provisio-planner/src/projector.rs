//! Encodes a slice and a change request into a constraint problem and
//! drives the solver.
//!
//! Every candidate unit becomes one boolean. Requested additions and
//! strictly pinned profile units are assertions; mandatory requirements
//! become implication clauses over their in-slice providers; singleton id
//! groups become at-most-one constraints; patches guard alternative
//! requirement clauses on the patch's own selection. Optional inclusion
//! and greedy optional requirements are handed to the solver as soft work
//! that can never fail the solve.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;

use provisio_version::VersionRange;

use crate::explanation::Explanation;
use crate::filter::Environment;
use crate::metadata::{InstallableUnit, Requirement};
use crate::monitor::Monitor;
use crate::profile::Profile;
use crate::request::{InclusionRule, ProfileChangeRequest};
use crate::slicer::Slice;
use crate::solver::{
    ConflictInfo, GreedyChoice, GreedySlot, PatchedChoice, Policy, Pool, Rule, RuleKind, RuleSet,
    SatSolver, SoftFailure, SoftJob, SoftOrigin, SolveOutcome, UnitId,
};
use crate::status::PlanStatus;

pub struct Projector<'a> {
    slice: &'a Slice,
    profile: &'a Profile,
    request: &'a ProfileChangeRequest,
    env: &'a Environment,
    explain: bool,

    pool: Pool,
    policy: Policy,
    rules: RuleSet,
    soft: Vec<SoftJob>,
    greedy: Vec<GreedySlot>,

    /// Warnings accumulated while encoding (e.g. installed units that are
    /// no longer applicable).
    warnings: Vec<PlanStatus>,
    /// Structural failures detected before solving (a strict addition
    /// missing from the slice).
    encode_failures: Vec<Explanation>,
    /// Optional additions that could not even be attempted.
    dropped_additions: Vec<(Arc<InstallableUnit>, Explanation)>,

    /// How many requirement rewrites each patch contributed.
    patch_rewrites: HashMap<UnitId, usize>,

    explanations: Vec<Explanation>,
    soft_failures: Vec<SoftFailure>,
    selected: Vec<Arc<InstallableUnit>>,
    uninstallable: Vec<Arc<InstallableUnit>>,
}

impl<'a> Projector<'a> {
    pub fn new(
        slice: &'a Slice,
        profile: &'a Profile,
        request: &'a ProfileChangeRequest,
        env: &'a Environment,
        explain: bool,
    ) -> Self {
        Self {
            slice,
            profile,
            request,
            env,
            explain,
            pool: Pool::new(),
            policy: Policy::new(),
            rules: RuleSet::new(),
            soft: Vec::new(),
            greedy: Vec::new(),
            warnings: Vec::new(),
            encode_failures: Vec::new(),
            dropped_additions: Vec::new(),
            patch_rewrites: HashMap::new(),
            explanations: Vec::new(),
            soft_failures: Vec::new(),
            selected: Vec::new(),
            uninstallable: Vec::new(),
        }
    }

    /// Translate the slice and the request into rules, soft jobs and
    /// greedy slots.
    pub fn encode(&mut self) {
        for unit in self.slice.units() {
            self.pool.add_unit(unit.clone());
        }

        let installed: Vec<UnitId> = self
            .profile
            .units()
            .iter()
            .filter_map(|u| self.pool.id_of(u))
            .collect();
        self.policy = Policy::with_installed(installed);

        let additions = self.request.effective_additions();
        let removals = self.request.effective_removals();

        self.encode_removals(&removals);
        self.encode_additions(&additions);
        self.encode_installed(&removals);
        self.encode_requirements();
        self.encode_singletons();
        self.encode_extra_requirements();

        log::debug!(
            "projected {} units into {} rules ({} requires, {} singleton), \
             {} soft jobs, {} greedy slots",
            self.pool.len(),
            self.rules.len(),
            self.rules.count_of_kind(RuleKind::UnitRequires),
            self.rules.count_of_kind(RuleKind::Singleton),
            self.soft.len(),
            self.greedy.len()
        );
    }

    fn encode_removals(&mut self, removals: &[Arc<InstallableUnit>]) {
        for unit in removals {
            // Removing something that is not a candidate is a no-op.
            if let Some(id) = self.pool.id_of(unit) {
                self.rules
                    .add(Rule::assertion(-id, RuleKind::Pinned).with_source(id));
            }
        }
    }

    fn encode_additions(&mut self, additions: &[Arc<InstallableUnit>]) {
        for unit in additions {
            let optional = matches!(
                self.request.inclusion_rule(unit),
                Some(InclusionRule::Optional)
            );

            match self.pool.id_of(unit) {
                Some(id) => {
                    if optional {
                        self.soft.push(SoftJob {
                            origin: SoftOrigin::RequestedAdd(id),
                            candidates: vec![id],
                        });
                    } else {
                        self.rules
                            .add(Rule::assertion(id, RuleKind::Root).with_source(id));
                    }
                }
                None => {
                    let requirement = Requirement::on_unit(
                        unit.id.clone(),
                        VersionRange::exact(unit.version.clone()),
                    );
                    let explanation = if self.slice.was_filtered(unit) {
                        Explanation::FilteredRequirement {
                            unit: Some(unit.clone()),
                            requirement,
                        }
                    } else {
                        Explanation::MissingRequirement {
                            unit: Some(unit.clone()),
                            requirement,
                        }
                    };

                    if optional {
                        self.dropped_additions.push((unit.clone(), explanation));
                    } else {
                        self.uninstallable.push(unit.clone());
                        self.encode_failures.push(explanation);
                    }
                }
            }
        }
    }

    fn encode_installed(&mut self, removals: &[Arc<InstallableUnit>]) {
        for unit in self.profile.units() {
            if removals.iter().any(|r| r.key() == unit.key()) {
                continue;
            }

            let optional = match self.request.inclusion_rule(unit) {
                Some(rule) => rule == InclusionRule::Optional,
                None => !self.profile.is_strict(unit),
            };

            match self.pool.id_of(unit) {
                Some(id) => {
                    if optional {
                        self.soft.push(SoftJob {
                            origin: SoftOrigin::InstalledRoot(id),
                            candidates: vec![id],
                        });
                    } else {
                        self.rules
                            .add(Rule::assertion(id, RuleKind::Pinned).with_source(id));
                    }
                }
                None => {
                    self.warnings.push(PlanStatus::warning(format!(
                        "installed unit {unit} is no longer applicable in this environment \
                         and will be removed"
                    )));
                }
            }
        }
    }

    fn encode_requirements(&mut self) {
        let units: Vec<(UnitId, Arc<InstallableUnit>)> = self
            .pool
            .ids()
            .filter_map(|id| self.pool.unit(id).map(|u| (id, u.clone())))
            .collect();

        let patches: Vec<(UnitId, Arc<InstallableUnit>)> = units
            .iter()
            .filter(|(_, u)| u.is_patch())
            .cloned()
            .collect();

        for (id, unit) in &units {
            for requirement in &unit.requirements {
                self.encode_requirement(*id, unit, requirement, &patches);
            }
            // A patch's lifecycle requirement binds the patch itself and
            // is never rewritten.
            if let Some(patch) = &unit.patch {
                if let Some(lifecycle) = &patch.lifecycle {
                    self.encode_requirement(*id, unit, lifecycle, &[]);
                }
            }
        }
    }

    fn encode_requirement(
        &mut self,
        source: UnitId,
        unit: &Arc<InstallableUnit>,
        requirement: &Requirement,
        patches: &[(UnitId, Arc<InstallableUnit>)],
    ) {
        // An inactive requirement is always satisfied. Malformed filters
        // were already flagged by the slicer.
        match self.env.requirement_active(requirement) {
            Ok(true) => {}
            _ => return,
        }

        if requirement.is_prohibition() {
            let providers = self.pool.providers_of(requirement);
            for provider in providers {
                if provider != source {
                    self.rules.add(
                        Rule::prohibits(source, provider)
                            .with_source(source)
                            .with_requirement(requirement.clone()),
                    );
                }
            }
            return;
        }

        // Patches whose scope covers this unit and whose changes rewrite
        // this requirement.
        let rewrites: Vec<(UnitId, Requirement)> = patches
            .iter()
            .filter(|(patch_id, _)| *patch_id != source)
            .filter_map(|(patch_id, patch_unit)| {
                let info = patch_unit.patch.as_ref()?;
                if !info.in_scope(unit) {
                    return None;
                }
                info.changes
                    .iter()
                    .find(|change| change.applies_to(requirement))
                    .map(|change| (*patch_id, change.to.clone()))
            })
            .collect();
        for (patch_id, _) in &rewrites {
            *self.patch_rewrites.entry(*patch_id).or_insert(0) += 1;
        }

        let providers = self.pool.providers_of(requirement);

        if requirement.is_optional() {
            if requirement.greedy {
                let patched = rewrites
                    .iter()
                    .map(|(patch_id, replacement)| {
                        let candidates = self.pool.providers_of(replacement);
                        PatchedChoice {
                            patch: *patch_id,
                            choice: GreedyChoice {
                                requirement: replacement.clone(),
                                candidates,
                            },
                        }
                    })
                    .collect();
                self.greedy.push(GreedySlot {
                    source,
                    original: GreedyChoice {
                        requirement: requirement.clone(),
                        candidates: providers,
                    },
                    patched,
                });
            }
            return;
        }

        if rewrites.is_empty() {
            if providers.is_empty() {
                let mut rule = Rule::assertion(-source, RuleKind::UnitRequires)
                    .with_source(source)
                    .with_requirement(requirement.clone());
                if !self.slice.filtered_providers_of(requirement).is_empty() {
                    rule = rule.mark_filtered();
                }
                self.rules.add(rule);
            } else {
                self.rules.add(
                    Rule::requires(source, providers)
                        .with_source(source)
                        .with_requirement(requirement.clone()),
                );
            }
            return;
        }

        // Requirement satisfaction with patches is "original OR (patch
        // active AND replacement)". In clause form that is the product
        // over patches of picking either the patch literal or the
        // replacement's providers:
        //   (-U ∨ orig ∨ P) ∧ (-U ∨ orig ∨ repl)
        let mut suffixes: Vec<Vec<UnitId>> = vec![Vec::new()];
        for (patch_id, replacement) in &rewrites {
            let replacement_providers = self.pool.providers_of(replacement);
            let mut next = Vec::with_capacity(suffixes.len() * 2);
            for suffix in &suffixes {
                let mut with_patch = suffix.clone();
                with_patch.push(*patch_id);
                next.push(with_patch);

                let mut with_replacement = suffix.clone();
                with_replacement.extend(&replacement_providers);
                next.push(with_replacement);
            }
            suffixes = next;
        }

        for suffix in suffixes {
            let mut literals = vec![-source];
            literals.extend(&providers);
            literals.extend(suffix);

            let mut seen = HashSet::new();
            literals.retain(|&l| seen.insert(l));

            self.rules.add(
                Rule::new(literals, RuleKind::PatchRequires)
                    .with_source(source)
                    .with_requirement(requirement.clone()),
            );
        }
    }

    fn encode_singletons(&mut self) {
        let mut groups: IndexMap<String, Vec<UnitId>> = IndexMap::new();
        for id in self.pool.ids() {
            let Some(unit) = self.pool.unit(id) else {
                continue;
            };
            if unit.singleton {
                groups.entry(unit.id.clone()).or_default().push(id);
            }
        }

        for (_, members) in groups {
            if members.len() > 1 {
                self.rules.add(Rule::singleton(members));
            }
        }
    }

    fn encode_extra_requirements(&mut self) {
        for requirement in &self.request.extra_requirements {
            match self.env.requirement_active(requirement) {
                Ok(true) => {}
                _ => continue,
            }

            if requirement.is_prohibition() {
                let providers = self.pool.providers_of(requirement);
                for provider in providers {
                    self.rules.add(
                        Rule::assertion(-provider, RuleKind::Pinned)
                            .with_requirement(requirement.clone()),
                    );
                }
                continue;
            }

            let providers = self.pool.providers_of(requirement);

            if !requirement.is_optional() {
                if providers.is_empty() {
                    let filtered = !self.slice.filtered_providers_of(requirement).is_empty();
                    self.encode_failures.push(if filtered {
                        Explanation::FilteredRequirement {
                            unit: None,
                            requirement: requirement.clone(),
                        }
                    } else {
                        Explanation::MissingRequirement {
                            unit: None,
                            requirement: requirement.clone(),
                        }
                    });
                } else {
                    self.rules
                        .add(Rule::new(providers, RuleKind::Root).with_requirement(requirement.clone()));
                }
            } else if requirement.greedy && !providers.is_empty() {
                self.soft.push(SoftJob {
                    origin: SoftOrigin::ExtraRequirement(requirement.clone()),
                    candidates: providers,
                });
            }
        }
    }

    /// Run the solver. The returned status carries the encode-time
    /// warnings plus the outcome.
    pub fn invoke_solver(&mut self, monitor: &dyn Monitor) -> PlanStatus {
        if !self.encode_failures.is_empty() {
            let mut status = PlanStatus::error("the change request cannot be satisfied");
            if self.explain {
                self.explanations = self.encode_failures.clone();
                for explanation in &self.explanations {
                    status.add_child(PlanStatus::error(explanation.to_string()));
                }
            }
            self.attach_warnings(&mut status);
            return status;
        }

        let solver = SatSolver::new(&self.pool, &self.policy);
        match solver.solve(self.rules.clone(), &self.soft, &self.greedy, monitor) {
            SolveOutcome::Cancelled => PlanStatus::cancel(),
            SolveOutcome::Sat(solution) => {
                let mut selected: Vec<Arc<InstallableUnit>> = solution
                    .selected
                    .iter()
                    .filter_map(|&id| self.pool.unit(id).cloned())
                    .collect();
                selected.sort_by(|a, b| a.key().cmp(&b.key()));
                self.selected = selected;
                self.soft_failures = solution.soft_failures;

                let mut status = PlanStatus::ok();
                self.check_inert_patches();
                self.attach_warnings(&mut status);
                status
            }
            SolveOutcome::Unsat(conflict) => {
                let mut status = PlanStatus::error("the change request cannot be satisfied");
                if self.explain {
                    self.explanations = self.explain_conflict(&conflict);
                    for explanation in &self.explanations {
                        status.add_child(PlanStatus::error(explanation.to_string()));
                    }
                    self.uninstallable = self.compute_uninstallable_roots(monitor);
                }
                self.attach_warnings(&mut status);
                status
            }
        }
    }

    fn attach_warnings(&mut self, status: &mut PlanStatus) {
        for warning in self.warnings.drain(..) {
            status.add_child(warning);
        }
    }

    /// A selected patch that rewrote nothing is inert; say so instead of
    /// silently carrying it.
    fn check_inert_patches(&mut self) {
        let selected_patches: Vec<(UnitId, Arc<InstallableUnit>)> = self
            .selected
            .iter()
            .filter(|u| u.is_patch())
            .filter_map(|u| self.pool.id_of(u).map(|id| (id, u.clone())))
            .collect();

        for (patch_id, patch_unit) in selected_patches {
            if self.patch_rewrites.get(&patch_id).copied().unwrap_or(0) > 0 {
                continue;
            }

            let info = patch_unit.patch.as_ref().expect("selected by is_patch");
            let reason = if info.changes.is_empty() {
                "it declares no requirement changes".to_string()
            } else {
                let any_in_scope = self.slice.units().iter().any(|u| {
                    u.key() != patch_unit.key() && info.in_scope(u)
                });
                if any_in_scope {
                    "no requirement of any unit in its scope matches its changes".to_string()
                } else {
                    "no candidate unit falls within its scope".to_string()
                }
            };

            let explanation = Explanation::PatchMismatch {
                patch: patch_unit.clone(),
                reason,
            };
            self.warnings
                .push(PlanStatus::warning(explanation.to_string()));
            self.explanations.push(explanation);
        }
    }

    fn explain_conflict(&self, conflict: &ConflictInfo) -> Vec<Explanation> {
        let mut explanations: Vec<Explanation> = Vec::new();
        let mut seen_messages: HashSet<String> = HashSet::new();

        let mut push = |explanation: Explanation, explanations: &mut Vec<Explanation>| {
            if seen_messages.insert(explanation.to_string()) {
                explanations.push(explanation);
            }
        };

        for rule in &conflict.rules {
            match rule.kind() {
                RuleKind::Singleton => {
                    let mut units: Vec<Arc<InstallableUnit>> = conflict
                        .selected
                        .iter()
                        .filter(|id| rule.literals().contains(&-(**id)))
                        .filter_map(|&id| self.pool.unit(id).cloned())
                        .collect();
                    if units.len() < 2 {
                        units = rule
                            .literals()
                            .iter()
                            .filter_map(|&l| self.pool.unit(l.unsigned_abs() as UnitId).cloned())
                            .collect();
                    }
                    push(Explanation::SingletonViolation { units }, &mut explanations);
                }
                RuleKind::UnitRequires | RuleKind::PatchRequires => {
                    let unit = rule.source().and_then(|id| self.pool.unit(id).cloned());
                    if let Some(requirement) = rule.requirement() {
                        let explanation = if rule.len() == 1 {
                            if rule.is_filtered() {
                                Explanation::FilteredRequirement {
                                    unit,
                                    requirement: requirement.clone(),
                                }
                            } else {
                                Explanation::MissingRequirement {
                                    unit,
                                    requirement: requirement.clone(),
                                }
                            }
                        } else {
                            Explanation::HardRequireConflict {
                                unit,
                                requirement: requirement.clone(),
                            }
                        };
                        push(explanation, &mut explanations);
                    }
                }
                RuleKind::Prohibition => {
                    if let Some(requirement) = rule.requirement() {
                        let unit = rule.source().and_then(|id| self.pool.unit(id).cloned());
                        push(
                            Explanation::HardRequireConflict {
                                unit,
                                requirement: requirement.clone(),
                            },
                            &mut explanations,
                        );
                    }
                }
                RuleKind::Root => {
                    // An empty root clause is an extra requirement with no
                    // providers; anything else is covered by the root core.
                    if rule.is_empty() {
                        if let Some(requirement) = rule.requirement() {
                            push(
                                Explanation::MissingRequirement {
                                    unit: None,
                                    requirement: requirement.clone(),
                                },
                                &mut explanations,
                            );
                        }
                    }
                }
                _ => {}
            }
        }

        explanations
    }

    /// Deletion-based minimal core over the root-level rules: the
    /// requested and installed top-level units that cannot all be
    /// satisfied together.
    fn compute_uninstallable_roots(&self, monitor: &dyn Monitor) -> Vec<Arc<InstallableUnit>> {
        let root_rules: Vec<u32> = self
            .rules
            .iter()
            .filter(|r| matches!(r.kind(), RuleKind::Root | RuleKind::Pinned) && !r.is_disabled())
            .map(|r| r.id())
            .collect();

        if root_rules.is_empty() {
            return Vec::new();
        }

        let mut dropped: HashSet<u32> = HashSet::new();
        for &candidate in &root_rules {
            if monitor.is_cancelled() {
                break;
            }

            let mut trial = self.rules.clone();
            for &id in dropped.iter().chain(std::iter::once(&candidate)) {
                trial.disable(id);
            }

            let solver = SatSolver::new(&self.pool, &self.policy);
            match solver.solve(trial, &[], &[], monitor) {
                // Still unsatisfiable without this root: it is not part
                // of the conflict.
                SolveOutcome::Unsat(_) => {
                    dropped.insert(candidate);
                }
                SolveOutcome::Sat(_) => {}
                SolveOutcome::Cancelled => break,
            }
        }

        let mut roots: Vec<Arc<InstallableUnit>> = Vec::new();
        for &id in &root_rules {
            if dropped.contains(&id) {
                continue;
            }
            let Some(rule) = self.rules.get(id) else {
                continue;
            };
            if let Some(unit) = rule.source().and_then(|uid| self.pool.unit(uid).cloned()) {
                if !roots.iter().any(|r| r.key() == unit.key()) {
                    roots.push(unit);
                }
            }
        }
        roots
    }

    pub fn extract_solution(&self) -> Vec<Arc<InstallableUnit>> {
        self.selected.clone()
    }

    pub fn explanations(&self) -> &[Explanation] {
        &self.explanations
    }

    pub fn uninstallable_roots(&self) -> &[Arc<InstallableUnit>] {
        &self.uninstallable
    }

    pub fn soft_failures(&self) -> &[SoftFailure] {
        &self.soft_failures
    }

    pub fn dropped_additions(&self) -> &[(Arc<InstallableUnit>, Explanation)] {
        &self.dropped_additions
    }

    pub fn unit_for(&self, id: UnitId) -> Option<Arc<InstallableUnit>> {
        self.pool.unit(id).cloned()
    }

    /// Human-readable reason for an absorbed soft failure.
    pub fn describe_soft_failure(&self, failure: &SoftFailure) -> String {
        match &failure.conflict {
            Some(rule) => {
                let conflict = ConflictInfo {
                    rules: vec![rule.clone()],
                    selected: Vec::new(),
                };
                self.explain_conflict(&conflict)
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "it conflicts with the rest of the solution".to_string())
            }
            None => "it conflicts with the rest of the solution".to_string(),
        }
    }
}
