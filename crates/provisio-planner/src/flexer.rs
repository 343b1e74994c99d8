//! Request relaxation.
//!
//! When a change request fails to resolve, the flexer searches a
//! constrained space of relaxed requests (other versions of the failing
//! additions, updates or removal of conflicting installed roots, partial
//! install) from least to most invasive, and returns the first request
//! that resolves. Which relaxations are on the table is policy, not
//! heuristics: nothing is relaxed unless its flag says so, and units of a
//! shared base installation are never touched.

use std::sync::Arc;

use crate::context::ProvisioningContext;
use crate::metadata::InstallableUnit;
use crate::monitor::Monitor;
use crate::plan::ProvisioningPlan;
use crate::planner::Planner;
use crate::profile::Profile;
use crate::request::{InclusionRule, ProfileChangeRequest};

#[derive(Debug, Clone)]
pub struct FlexerPolicy {
    /// Allow substituting a different version of a requested unit.
    pub allow_different_version: bool,
    /// Allow dropping some requested additions (best-effort install).
    pub allow_partial_install: bool,
    /// Allow removing already-installed roots that block the request.
    pub allow_installed_removal: bool,
    /// Allow changing (updating) already-installed roots.
    pub allow_installed_change: bool,
    /// Upper bound on re-planning attempts.
    pub attempt_budget: usize,
}

impl Default for FlexerPolicy {
    fn default() -> Self {
        Self {
            allow_different_version: false,
            allow_partial_install: false,
            allow_installed_removal: false,
            allow_installed_change: false,
            attempt_budget: 24,
        }
    }
}

impl FlexerPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn different_version(mut self, allow: bool) -> Self {
        self.allow_different_version = allow;
        self
    }

    pub fn partial_install(mut self, allow: bool) -> Self {
        self.allow_partial_install = allow;
        self
    }

    pub fn installed_removal(mut self, allow: bool) -> Self {
        self.allow_installed_removal = allow;
        self
    }

    pub fn installed_change(mut self, allow: bool) -> Self {
        self.allow_installed_change = allow;
        self
    }
}

pub struct RequestFlexer<'a> {
    planner: &'a Planner,
    policy: FlexerPolicy,
}

impl<'a> RequestFlexer<'a> {
    pub fn new(planner: &'a Planner, policy: FlexerPolicy) -> Self {
        Self { planner, policy }
    }

    /// Find the closest resolvable request under the active policy.
    /// Returns the relaxed request and its plan, or `None` when nothing
    /// within the policy (and budget) resolves.
    pub fn flex(
        &self,
        profile: &Profile,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn Monitor,
    ) -> Option<(ProfileChangeRequest, ProvisioningPlan)> {
        let base = self
            .planner
            .get_provisioning_plan(profile, request, context, monitor);
        if base.status.is_ok() {
            return Some((request.clone(), base));
        }
        if base.status.is_cancelled() {
            return None;
        }

        // The roots implicated in the conflict; when explanation
        // generation was off, fall back to everything requested.
        let conflicting: Vec<Arc<InstallableUnit>> = if base.uninstallable_roots.is_empty() {
            request.effective_additions()
        } else {
            base.uninstallable_roots.clone()
        };

        let mut budget = self.policy.attempt_budget;

        if self.policy.allow_different_version {
            if let Some(found) =
                self.try_other_versions(profile, request, context, monitor, &conflicting, &mut budget)
            {
                return Some(found);
            }
        }

        if self.policy.allow_installed_change {
            if let Some(found) = self.try_installed_change(
                profile,
                request,
                context,
                monitor,
                &conflicting,
                &mut budget,
            ) {
                return Some(found);
            }
        }

        if self.policy.allow_installed_removal {
            if let Some(found) = self.try_installed_removal(
                profile,
                request,
                context,
                monitor,
                &conflicting,
                &mut budget,
            ) {
                return Some(found);
            }
        }

        if self.policy.allow_partial_install {
            if let Some(found) =
                self.try_partial_install(profile, request, context, monitor, &conflicting, &mut budget)
            {
                return Some(found);
            }
        }

        log::debug!("no resolvable relaxation found under the active policy");
        None
    }

    /// Substitute other versions of the failing additions, highest first.
    fn try_other_versions(
        &self,
        profile: &Profile,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn Monitor,
        conflicting: &[Arc<InstallableUnit>],
        budget: &mut usize,
    ) -> Option<(ProfileChangeRequest, ProvisioningPlan)> {
        for unit in request.effective_additions() {
            if !conflicting.iter().any(|c| c.key() == unit.key()) {
                continue;
            }
            for sibling in self.siblings(context, &unit) {
                let mut candidate = request.clone();
                swap_addition(&mut candidate, &unit, sibling);
                if let Some(found) =
                    self.try_candidate(profile, candidate, context, monitor, budget)
                {
                    return Some(found);
                }
                if *budget == 0 || monitor.is_cancelled() {
                    return None;
                }
            }
        }
        None
    }

    /// Let a conflicting installed root move to another version.
    fn try_installed_change(
        &self,
        profile: &Profile,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn Monitor,
        conflicting: &[Arc<InstallableUnit>],
        budget: &mut usize,
    ) -> Option<(ProfileChangeRequest, ProvisioningPlan)> {
        for unit in self.relaxable_installed(profile, conflicting) {
            for sibling in self.siblings(context, &unit) {
                let mut candidate = request.clone();
                candidate
                    .set_inclusion_rule(&unit, InclusionRule::Optional)
                    .add(sibling.clone())
                    .set_inclusion_rule(&sibling, InclusionRule::Optional);
                if let Some(found) =
                    self.try_candidate(profile, candidate, context, monitor, budget)
                {
                    return Some(found);
                }
                if *budget == 0 || monitor.is_cancelled() {
                    return None;
                }
            }
        }
        None
    }

    /// Let the conflicting installed roots be dropped entirely.
    fn try_installed_removal(
        &self,
        profile: &Profile,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn Monitor,
        conflicting: &[Arc<InstallableUnit>],
        budget: &mut usize,
    ) -> Option<(ProfileChangeRequest, ProvisioningPlan)> {
        let relaxable = self.relaxable_installed(profile, conflicting);
        if relaxable.is_empty() {
            return None;
        }

        let mut candidate = request.clone();
        for unit in &relaxable {
            candidate.set_inclusion_rule(unit, InclusionRule::Optional);
        }
        self.try_candidate(profile, candidate, context, monitor, budget)
    }

    /// Drop what cannot be installed: first just the conflicting
    /// additions, then everything requested.
    fn try_partial_install(
        &self,
        profile: &Profile,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn Monitor,
        conflicting: &[Arc<InstallableUnit>],
        budget: &mut usize,
    ) -> Option<(ProfileChangeRequest, ProvisioningPlan)> {
        let mut candidate = request.clone();
        for unit in request.effective_additions() {
            if conflicting.iter().any(|c| c.key() == unit.key()) {
                candidate.set_inclusion_rule(&unit, InclusionRule::Optional);
            }
        }
        if let Some(found) = self.try_candidate(profile, candidate, context, monitor, budget) {
            return Some(found);
        }
        if *budget == 0 || monitor.is_cancelled() {
            return None;
        }

        let mut all_optional = request.clone();
        for unit in request.effective_additions() {
            all_optional.set_inclusion_rule(&unit, InclusionRule::Optional);
        }
        self.try_candidate(profile, all_optional, context, monitor, budget)
    }

    fn try_candidate(
        &self,
        profile: &Profile,
        candidate: ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn Monitor,
        budget: &mut usize,
    ) -> Option<(ProfileChangeRequest, ProvisioningPlan)> {
        if *budget == 0 || monitor.is_cancelled() {
            return None;
        }
        *budget -= 1;

        let plan = self
            .planner
            .get_provisioning_plan(profile, &candidate, context, monitor);
        if plan.status.is_ok() {
            log::debug!(
                "relaxed request resolved with {} operand(s)",
                plan.operands.len()
            );
            return Some((candidate, plan));
        }
        None
    }

    /// Conflicting installed roots the policy may touch: shared-base
    /// units are immutable.
    fn relaxable_installed(
        &self,
        profile: &Profile,
        conflicting: &[Arc<InstallableUnit>],
    ) -> Vec<Arc<InstallableUnit>> {
        profile
            .units()
            .iter()
            .filter(|u| conflicting.iter().any(|c| c.key() == u.key()))
            .filter(|u| !profile.is_shared(u))
            .cloned()
            .collect()
    }

    /// Other versions of the unit known to the context, highest first.
    fn siblings(
        &self,
        context: &ProvisioningContext,
        unit: &InstallableUnit,
    ) -> Vec<Arc<InstallableUnit>> {
        let mut siblings: Vec<Arc<InstallableUnit>> = context
            .universe()
            .into_iter()
            .filter(|u| u.id == unit.id && u.version != unit.version)
            .collect();
        siblings.sort_by(|a, b| b.version.cmp(&a.version));
        siblings
    }
}

fn swap_addition(
    request: &mut ProfileChangeRequest,
    old: &Arc<InstallableUnit>,
    new: Arc<InstallableUnit>,
) {
    if let Some(slot) = request
        .additions
        .iter_mut()
        .find(|u| u.key() == old.key())
    {
        *slot = new.clone();
    }
    if let Some(rule) = request.inclusion_rule(old) {
        request.set_inclusion_rule(&new, rule);
    }
}
