use serde::Serialize;
use utoipa::ToSchema;

use crate::models::{Course, RoleFlags};

/// ViewVariant
///
/// The fixed set of dashboard layouts. Which one renders is a pure function
/// of the role flags, evaluated only after the authorization gate grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ViewVariant {
    LearnerDashboard,
    EducatorDashboard,
    AdminDashboard,
}

/// compose
///
/// Maps role flags to a dashboard variant.
///
/// Precedence rule (explicit, not an accident): the educator check runs
/// before the admin check, so an identity that somehow satisfied both renders
/// the educator view. The admin branch checks `is_admin` and
/// `is_super_admin` separately, consistent with the flags being disjoint.
/// Learner is the default.
pub fn compose(flags: &RoleFlags) -> ViewVariant {
    if flags.is_educator {
        ViewVariant::EducatorDashboard
    } else if flags.is_admin || flags.is_super_admin {
        ViewVariant::AdminDashboard
    } else {
        ViewVariant::LearnerDashboard
    }
}

/// DashboardView
///
/// Output schema for GET /dashboard: the composed variant plus the data the
/// variant renders. Enrollments are populated for the learner view, which
/// lists the caller's courses; the educator and admin views are layout
/// placeholders over the same shell.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardView {
    pub variant: ViewVariant,
    pub enrollments: Vec<Course>,
}
