use course_market::models::{Role, RoleFlags};
use course_market::views::{ViewVariant, compose};

#[test]
fn learner_is_the_default_variant() {
    assert_eq!(
        compose(&RoleFlags::from_role(Some(Role::Learner))),
        ViewVariant::LearnerDashboard
    );
    // An unresolved role also falls through to the default.
    assert_eq!(
        compose(&RoleFlags::from_role(None)),
        ViewVariant::LearnerDashboard
    );
}

#[test]
fn educator_flag_selects_the_educator_dashboard() {
    assert_eq!(
        compose(&RoleFlags::from_role(Some(Role::Educator))),
        ViewVariant::EducatorDashboard
    );
}

#[test]
fn admin_and_super_admin_both_select_the_admin_dashboard() {
    // Checked as two flags, consistent with their disjointness.
    assert_eq!(
        compose(&RoleFlags::from_role(Some(Role::Admin))),
        ViewVariant::AdminDashboard
    );
    assert_eq!(
        compose(&RoleFlags::from_role(Some(Role::SuperAdmin))),
        ViewVariant::AdminDashboard
    );
}

#[test]
fn educator_takes_precedence_over_admin() {
    // Documented precedence rule: the educator branch is evaluated before
    // the admin branch, so an identity that somehow satisfied both renders
    // the educator view.
    let both = RoleFlags {
        is_educator: true,
        is_admin: true,
        is_super_admin: false,
    };
    assert_eq!(compose(&both), ViewVariant::EducatorDashboard);

    let educator_and_super = RoleFlags {
        is_educator: true,
        is_admin: false,
        is_super_admin: true,
    };
    assert_eq!(compose(&educator_and_super), ViewVariant::EducatorDashboard);
}
