//! The planning entry points.
//!
//! One planning call is a straight pipeline: slice the candidate
//! universe, project it into a constraint problem, solve, then diff the
//! solution against the profile into operands. All inputs are read-only
//! snapshots; nothing is persisted here.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use crate::context::ProvisioningContext;
use crate::metadata::{InstallableUnit, UnitKey};
use crate::monitor::Monitor;
use crate::plan::{diff_states, Operand, ProvisioningPlan};
use crate::profile::Profile;
use crate::projector::Projector;
use crate::request::ProfileChangeRequest;
use crate::slicer::Slicer;
use crate::solver::SoftOrigin;
use crate::status::{PlanStatus, RequestKind, RequestStatus};

#[derive(Debug, Clone, Copy, Default)]
pub struct Planner;

impl Planner {
    pub fn new() -> Self {
        Self
    }

    /// Compute a provisioning plan for the change request, or a failing
    /// plan explaining why none exists. Never panics or errors: the
    /// outcome is always encoded in the plan's status.
    pub fn get_provisioning_plan(
        &self,
        profile: &Profile,
        request: &ProfileChangeRequest,
        context: &ProvisioningContext,
        monitor: &dyn Monitor,
    ) -> ProvisioningPlan {
        let start = Instant::now();
        let env = context.environment(profile);

        let mut seeds: Vec<Arc<InstallableUnit>> = profile.units().to_vec();
        seeds.extend(request.effective_additions());

        let slicer = Slicer::new(context.universe(), &env);
        let slice = slicer.slice(&seeds, &request.extra_requirements, monitor);
        if slice.status.is_cancelled() {
            return ProvisioningPlan::cancelled();
        }
        if slice.status.is_error() {
            return ProvisioningPlan::with_status(slice.status.clone());
        }

        let mut projector = Projector::new(
            &slice,
            profile,
            request,
            &env,
            context.explanation_enabled(),
        );
        projector.encode();

        let mut status = projector.invoke_solver(monitor);
        for warning in &slice.status.children {
            status.add_child(warning.clone());
        }

        if status.is_cancelled() {
            return ProvisioningPlan::cancelled();
        }
        if status.is_error() {
            let request_statuses = self.failure_request_statuses(request, &projector);
            log::info!(
                "planning failed for profile `{}` in {:.3}s",
                profile.id,
                start.elapsed().as_secs_f64()
            );
            return ProvisioningPlan {
                status,
                operands: Vec::new(),
                explanations: projector.explanations().to_vec(),
                request_statuses,
                uninstallable_roots: projector.uninstallable_roots().to_vec(),
                future_state: Vec::new(),
            };
        }

        let future_state = projector.extract_solution();
        let mut operands = diff_states(profile.units(), &future_state);
        self.append_property_operands(request, &future_state, &mut operands);

        let request_statuses = self.success_request_statuses(request, &future_state, &projector);
        self.report_absorbed_failures(&projector, &mut status);

        log::info!(
            "planned profile `{}` in {:.3}s: {} operand(s)",
            profile.id,
            start.elapsed().as_secs_f64(),
            operands.len()
        );

        ProvisioningPlan {
            status,
            operands,
            explanations: projector.explanations().to_vec(),
            request_statuses,
            uninstallable_roots: Vec::new(),
            future_state,
        }
    }

    /// A revert plan: the operand diff between two persisted profile
    /// states, including profile property changes.
    pub fn get_diff_plan(
        &self,
        current: &Profile,
        target: &Profile,
        monitor: &dyn Monitor,
    ) -> ProvisioningPlan {
        if monitor.is_cancelled() {
            return ProvisioningPlan::cancelled();
        }

        let mut operands = diff_states(current.units(), target.units());

        for (key, value) in &target.properties {
            if current.properties.get(key) != Some(value) {
                operands.push(Operand::SetProfileProperty {
                    key: key.clone(),
                    value: Some(value.clone()),
                });
            }
        }
        for key in current.properties.keys() {
            if !target.properties.contains_key(key) {
                operands.push(Operand::SetProfileProperty {
                    key: key.clone(),
                    value: None,
                });
            }
        }

        ProvisioningPlan {
            status: PlanStatus::ok(),
            operands,
            explanations: Vec::new(),
            request_statuses: Vec::new(),
            uninstallable_roots: Vec::new(),
            future_state: target.units().to_vec(),
        }
    }

    /// Property operands from the request. Unit property changes only
    /// apply to units present in the final state; a property change on a
    /// unit the solver dropped produces no operand.
    fn append_property_operands(
        &self,
        request: &ProfileChangeRequest,
        future_state: &[Arc<InstallableUnit>],
        operands: &mut Vec<Operand>,
    ) {
        let by_key: std::collections::HashMap<UnitKey, Arc<InstallableUnit>> = future_state
            .iter()
            .map(|u| (u.key(), u.clone()))
            .collect();

        let mut unit_changes: Vec<_> = request.unit_property_changes().collect();
        unit_changes.sort_by(|a, b| a.0.cmp(b.0));

        for (key, edits) in unit_changes {
            let Some(unit) = by_key.get(key) else {
                continue;
            };
            for (prop_key, value) in edits {
                operands.push(Operand::SetUnitProperty {
                    unit: unit.clone(),
                    key: prop_key.clone(),
                    value: value.clone(),
                });
            }
        }

        for (key, value) in request.profile_property_changes() {
            operands.push(Operand::SetProfileProperty {
                key: key.clone(),
                value: value.clone(),
            });
        }
    }

    fn success_request_statuses(
        &self,
        request: &ProfileChangeRequest,
        future_state: &[Arc<InstallableUnit>],
        projector: &Projector<'_>,
    ) -> Vec<RequestStatus> {
        let final_keys: HashSet<UnitKey> = future_state.iter().map(|u| u.key()).collect();
        let mut statuses = Vec::new();

        for unit in request.effective_additions() {
            if final_keys.contains(&unit.key()) {
                statuses.push(RequestStatus::ok(unit, RequestKind::Add));
                continue;
            }

            // Dropped best-effort: find out why.
            let dropped = projector
                .dropped_additions()
                .iter()
                .find(|(dropped_unit, _)| dropped_unit.key() == unit.key())
                .map(|(_, explanation)| explanation.to_string());
            let message = dropped.unwrap_or_else(|| {
                projector
                    .soft_failures()
                    .iter()
                    .find(|failure| match failure.origin {
                        SoftOrigin::RequestedAdd(id) => projector
                            .unit_for(id)
                            .is_some_and(|u| u.key() == unit.key()),
                        _ => false,
                    })
                    .map(|failure| projector.describe_soft_failure(failure))
                    .unwrap_or_else(|| "the unit was dropped from the solution".to_string())
            });
            statuses.push(RequestStatus::warning(unit, RequestKind::Add, message));
        }

        for unit in request.effective_removals() {
            if final_keys.contains(&unit.key()) {
                statuses.push(RequestStatus::error(
                    unit,
                    RequestKind::Remove,
                    "the unit is still required by the solution",
                ));
            } else {
                statuses.push(RequestStatus::ok(unit, RequestKind::Remove));
            }
        }

        statuses
    }

    fn failure_request_statuses(
        &self,
        request: &ProfileChangeRequest,
        projector: &Projector<'_>,
    ) -> Vec<RequestStatus> {
        let uninstallable: HashSet<UnitKey> = projector
            .uninstallable_roots()
            .iter()
            .map(|u| u.key())
            .collect();

        let mut statuses = Vec::new();
        for unit in request.effective_additions() {
            let message = if uninstallable.contains(&unit.key()) {
                projector
                    .explanations()
                    .first()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "the unit cannot be installed".to_string())
            } else {
                "the request could not be satisfied".to_string()
            };
            statuses.push(RequestStatus::error(unit, RequestKind::Add, message));
        }
        for unit in request.effective_removals() {
            statuses.push(RequestStatus::error(
                unit,
                RequestKind::Remove,
                "the request could not be satisfied",
            ));
        }
        statuses
    }

    /// Absorbed optional failures become WARNING children so callers can
    /// see what best-effort work was dropped.
    fn report_absorbed_failures(&self, projector: &Projector<'_>, status: &mut PlanStatus) {
        for failure in projector.soft_failures() {
            match &failure.origin {
                SoftOrigin::InstalledRoot(id) => {
                    if let Some(unit) = projector.unit_for(*id) {
                        status.add_child(PlanStatus::warning(format!(
                            "installed unit {unit} could not be kept: {}",
                            projector.describe_soft_failure(failure)
                        )));
                    }
                }
                SoftOrigin::ExtraRequirement(requirement) => {
                    status.add_child(PlanStatus::warning(format!(
                        "optional requirement {requirement} could not be satisfied: {}",
                        projector.describe_soft_failure(failure)
                    )));
                }
                // Requested additions are covered by their RequestStatus.
                SoftOrigin::RequestedAdd(_) => {}
            }
        }

        for (unit, explanation) in projector.dropped_additions() {
            status.add_child(PlanStatus::warning(format!(
                "requested unit {unit} was dropped: {explanation}"
            )));
        }
    }
}
