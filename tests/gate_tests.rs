use course_market::gate::{GateState, RoleRequirement, RouteRequirement, evaluate};
use course_market::models::{Identity, Role};
use course_market::role::RoleState;
use course_market::session::SessionState;
use uuid::Uuid;

fn anonymous() -> SessionState {
    SessionState {
        identity: None,
        is_loading: false,
        epoch: 1,
    }
}

fn signed_in() -> SessionState {
    SessionState {
        identity: Some(Identity {
            id: Uuid::new_v4(),
            email: "who@example.com".to_string(),
        }),
        is_loading: false,
        epoch: 1,
    }
}

fn loading() -> SessionState {
    SessionState {
        identity: None,
        is_loading: true,
        epoch: 0,
    }
}

fn role(role: Option<Role>) -> RoleState {
    RoleState {
        role,
        is_loading: false,
    }
}

#[test]
fn unresolved_while_the_session_is_loading() {
    let state = evaluate(&loading(), &role(None), &RouteRequirement::authenticated());
    assert_eq!(state, GateState::Unresolved);
}

#[test]
fn unresolved_while_the_role_is_loading() {
    let in_flight = RoleState {
        role: None,
        is_loading: true,
    };
    let state = evaluate(&signed_in(), &in_flight, &RouteRequirement::authenticated());
    assert_eq!(state, GateState::Unresolved);
}

#[test]
fn anonymous_visitor_is_denied_on_protected_routes() {
    let state = evaluate(&anonymous(), &role(None), &RouteRequirement::authenticated());
    assert_eq!(state, GateState::Denied);
}

#[test]
fn anonymous_visitor_passes_public_routes() {
    let state = evaluate(&anonymous(), &role(None), &RouteRequirement::public());
    assert_eq!(state, GateState::Granted);
}

#[test]
fn present_identity_is_granted_without_a_role_requirement() {
    // Even with an unresolved role: authentication alone satisfies the route.
    let state = evaluate(&signed_in(), &role(None), &RouteRequirement::authenticated());
    assert_eq!(state, GateState::Granted);
}

#[test]
fn educator_requirement_checks_the_educator_flag() {
    let requirement = RouteRequirement::with_role(RoleRequirement::Educator);

    let granted = evaluate(&signed_in(), &role(Some(Role::Educator)), &requirement);
    assert_eq!(granted, GateState::Granted);

    let denied = evaluate(&signed_in(), &role(Some(Role::Learner)), &requirement);
    assert_eq!(denied, GateState::Denied);
}

#[test]
fn admin_or_above_admits_both_admin_and_super_admin() {
    // The flags are disjoint, so the requirement has to check both; this
    // pins that a super admin is not locked out by the quirk.
    let requirement = RouteRequirement::with_role(RoleRequirement::AdminOrAbove);

    for admitted in [Role::Admin, Role::SuperAdmin] {
        let state = evaluate(&signed_in(), &role(Some(admitted)), &requirement);
        assert_eq!(state, GateState::Granted, "{admitted:?}");
    }

    for refused in [Role::Learner, Role::Educator] {
        let state = evaluate(&signed_in(), &role(Some(refused)), &requirement);
        assert_eq!(state, GateState::Denied, "{refused:?}");
    }
}

#[test]
fn unresolved_role_never_satisfies_a_role_requirement() {
    // Fail-closed: an identity whose role could not be resolved carries no
    // elevated capability.
    let requirement = RouteRequirement::with_role(RoleRequirement::AdminOrAbove);
    let state = evaluate(&signed_in(), &role(None), &requirement);
    assert_eq!(state, GateState::Denied);
}
