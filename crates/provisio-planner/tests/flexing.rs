//! Request relaxation scenarios.

use std::sync::Arc;

use provisio_planner::{
    FlexerPolicy, InMemoryRepository, InstallableUnit, NullMonitor, Planner, Profile,
    ProfileChangeRequest, ProvisioningContext, Requirement, RequestFlexer, Version, VersionRange,
    PROP_SHARED_BASE,
};

fn v(major: u64, minor: u64, micro: u64) -> Version {
    Version::new(major, minor, micro)
}

fn unit(id: &str, version: Version) -> InstallableUnit {
    InstallableUnit::new(id, version)
}

fn req(id: &str, text: &str) -> Requirement {
    Requirement::on_unit(id, VersionRange::parse(text).unwrap())
}

fn context_of(units: Vec<InstallableUnit>) -> ProvisioningContext {
    let mut context = ProvisioningContext::new();
    context.add_source(Arc::new(InMemoryRepository::with_units(units)));
    context
}

/// x@2 requires something that does not exist; x@1 is self-contained.
fn broken_v2_universe() -> (Arc<InstallableUnit>, ProvisioningContext) {
    let x1 = unit("x", v(1, 0, 0));
    let mut x2 = unit("x", v(2, 0, 0));
    x2.requirements.push(req("missing", "0.0.0"));
    let x2 = Arc::new(x2);
    let context = context_of(vec![x1, (*x2).clone()]);
    (x2, context)
}

#[test]
fn resolvable_request_passes_through_unchanged() {
    let a = Arc::new(unit("a", v(1, 0, 0)));
    let context = context_of(vec![(*a).clone()]);
    let profile = Profile::new("test");

    let mut request = ProfileChangeRequest::new();
    request.add(a);

    let planner = Planner::new();
    let flexer = RequestFlexer::new(&planner, FlexerPolicy::new());
    let (flexed, plan) = flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .expect("resolvable request must pass through");

    assert_eq!(flexed.additions.len(), 1);
    assert!(plan.status.is_ok());
}

#[test]
fn no_active_policy_means_no_relaxation() {
    let (x2, context) = broken_v2_universe();
    let profile = Profile::new("test");

    let mut request = ProfileChangeRequest::new();
    request.add(x2);

    let planner = Planner::new();
    let flexer = RequestFlexer::new(&planner, FlexerPolicy::new());
    assert!(flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .is_none());
}

#[test]
fn different_version_substitutes_a_working_sibling() {
    let (x2, context) = broken_v2_universe();
    let profile = Profile::new("test");

    let mut request = ProfileChangeRequest::new();
    request.add(x2);

    let planner = Planner::new();
    let flexer = RequestFlexer::new(&planner, FlexerPolicy::new().different_version(true));
    let (flexed, plan) = flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .expect("x@1 resolves");

    assert_eq!(flexed.additions[0].version, v(1, 0, 0));
    assert!(plan
        .future_state
        .iter()
        .any(|u| u.id == "x" && u.version == v(1, 0, 0)));
}

#[test]
fn partial_install_drops_only_the_broken_addition() {
    let mut broken = unit("broken", v(1, 0, 0));
    broken.requirements.push(req("missing", "0.0.0"));
    let broken = Arc::new(broken);
    let fine = Arc::new(unit("fine", v(1, 0, 0)));

    let context = context_of(vec![(*broken).clone(), (*fine).clone()]);
    let profile = Profile::new("test");

    let mut request = ProfileChangeRequest::new();
    request.add(broken).add(fine);

    let planner = Planner::new();
    let flexer = RequestFlexer::new(&planner, FlexerPolicy::new().partial_install(true));
    let (_, plan) = flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .expect("partial install resolves");

    assert!(plan.status.is_ok());
    assert!(plan.future_state.iter().any(|u| u.id == "fine"));
    assert!(!plan.future_state.iter().any(|u| u.id == "broken"));
}

#[test]
fn installed_removal_displaces_a_conflicting_root() {
    let mut a1 = unit("a", v(1, 0, 0));
    a1.singleton = true;
    let mut a2 = unit("a", v(2, 0, 0));
    a2.singleton = true;
    let a1 = Arc::new(a1);
    let a2 = Arc::new(a2);

    let context = context_of(vec![(*a1).clone(), (*a2).clone()]);
    let mut profile = Profile::new("test");
    profile.add_unit(a1.clone());

    let mut request = ProfileChangeRequest::new();
    request.add(a2);

    let planner = Planner::new();

    // Without the policy the conflict stands.
    let strict_flexer = RequestFlexer::new(&planner, FlexerPolicy::new());
    assert!(strict_flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .is_none());

    let flexer = RequestFlexer::new(&planner, FlexerPolicy::new().installed_removal(true));
    let (_, plan) = flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .expect("removing the installed root resolves");

    assert!(plan.status.is_ok());
    assert!(plan
        .future_state
        .iter()
        .any(|u| u.id == "a" && u.version == v(2, 0, 0)));
    assert!(!plan
        .future_state
        .iter()
        .any(|u| u.id == "a" && u.version == v(1, 0, 0)));
}

#[test]
fn shared_base_units_are_never_relaxed() {
    let mut a1 = unit("a", v(1, 0, 0));
    a1.singleton = true;
    let mut a2 = unit("a", v(2, 0, 0));
    a2.singleton = true;
    let a1 = Arc::new(a1);
    let a2 = Arc::new(a2);

    let context = context_of(vec![(*a1).clone(), (*a2).clone()]);
    let mut profile = Profile::new("test");
    profile.add_unit(a1.clone());
    profile.set_unit_property(&a1, PROP_SHARED_BASE, "true");

    let mut request = ProfileChangeRequest::new();
    request.add(a2);

    let planner = Planner::new();
    let flexer = RequestFlexer::new(
        &planner,
        FlexerPolicy::new()
            .installed_removal(true)
            .installed_change(true),
    );
    assert!(flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .is_none());
}

#[test]
fn installed_change_updates_a_conflicting_root() {
    // y@1 is installed and pinned; the requested app needs y >= 2.
    let y1 = unit("y", v(1, 0, 0));
    let y2 = unit("y", v(2, 0, 0));
    let mut app = unit("app", v(1, 0, 0));
    app.requirements.push(req("y", "[2.0.0,3.0.0)"));
    let app = Arc::new(app);

    let mut y1_singleton = y1;
    y1_singleton.singleton = true;
    let mut y2_singleton = y2;
    y2_singleton.singleton = true;
    let y1 = Arc::new(y1_singleton);

    let context = context_of(vec![(*y1).clone(), y2_singleton, (*app).clone()]);
    let mut profile = Profile::new("test");
    profile.add_unit(y1.clone());

    let mut request = ProfileChangeRequest::new();
    request.add(app);

    let planner = Planner::new();
    let flexer = RequestFlexer::new(&planner, FlexerPolicy::new().installed_change(true));
    let (_, plan) = flexer
        .flex(&profile, &request, &context, &NullMonitor)
        .expect("updating y resolves");

    assert!(plan.status.is_ok(), "{}", plan.status.describe());
    assert!(plan.future_state.iter().any(|u| u.id == "app"));
    assert!(plan
        .future_state
        .iter()
        .any(|u| u.id == "y" && u.version == v(2, 0, 0)));
}
