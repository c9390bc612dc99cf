use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

// --- Identity & Role ---

/// Identity
///
/// The authenticated principal returned by the hosted backend after sign-in
/// or sign-up. Lives exactly as long as the session; destroyed on sign-out
/// or external expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    /// Opaque unique id, shared with the backend's `profiles` table.
    pub id: Uuid,
    pub email: String,
}

/// Role
///
/// Capability classification attached 1:1 to an Identity via its remote
/// profile record. Closed set: the wire value is validated at the data-access
/// boundary and unknown strings are rejected rather than carried around.
///
/// The backend spells the learner role `user`; everything else matches the
/// variant name in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(rename = "user")]
    Learner,
    Educator,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Validates a raw role string from the backend. `None` means the value
    /// is not part of the closed set and must be treated as unresolved.
    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "user" => Some(Role::Learner),
            "educator" => Some(Role::Educator),
            "admin" => Some(Role::Admin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "user",
            Role::Educator => "educator",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

/// RoleFlags
///
/// Derived capability flags, each a pure equality check against the resolved
/// role. `is_admin` and `is_super_admin` are deliberately **disjoint** — a
/// super admin does not set `is_admin`. Call sites that mean "admin or
/// above" must check both flags explicitly; this mirrors how the flags are
/// consumed elsewhere and is not to be silently collapsed into one check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleFlags {
    pub is_educator: bool,
    pub is_admin: bool,
    pub is_super_admin: bool,
}

impl RoleFlags {
    pub fn from_role(role: Option<Role>) -> Self {
        Self {
            is_educator: role == Some(Role::Educator),
            is_admin: role == Some(Role::Admin),
            is_super_admin: role == Some(Role::SuperAdmin),
        }
    }
}

// --- Remote records ---

/// Course
///
/// A course record mirrored from the backend's `courses` table. Read-only
/// from this front end's perspective; rows are owned by the backend and only
/// held transiently in view state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub instructor_id: Option<Uuid>,
    pub price: f64,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Enrollment
///
/// Relates one Identity to one Course. The existence of a row for the
/// (user, course) pair is the sole enrollment truth; there is no status field.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Enrollment {
    pub user_id: Uuid,
    pub course_id: Uuid,
}

// --- Request payloads ---

/// Credentials
///
/// Input payload for POST /login and POST /register. The password is passed
/// through to the hosted auth service and never persisted or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

// --- View models (output schemas) ---

/// SessionView
///
/// Output schema describing the current session after a successful sign-in
/// or for GET /me.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    pub identity: Identity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub flags: RoleFlags,
}

/// CourseView
///
/// Output schema for the course detail page: the course itself plus whether
/// the current visitor holds an enrollment row for it (always false for
/// anonymous visitors).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CourseView {
    pub course: Course,
    pub enrolled: bool,
}

/// AuthPrompt
///
/// Output schema for the sign-in / sign-up pages. These routes exist chiefly
/// as redirect targets for the authorization gate.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthPrompt {
    pub prompt: &'static str,
}

/// Notice
///
/// A transient, user-visible notification. Data-access failures are converted
/// to one of these at the point of the call instead of propagating upward.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Notice {
    pub ok: bool,
    pub message: String,
}

impl Notice {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_accepts_the_closed_set_only() {
        assert_eq!(Role::parse("user"), Some(Role::Learner));
        assert_eq!(Role::parse("educator"), Some(Role::Educator));
        assert_eq!(Role::parse("admin"), Some(Role::Admin));
        assert_eq!(Role::parse("super_admin"), Some(Role::SuperAdmin));
        assert_eq!(Role::parse("root"), None);
        assert_eq!(Role::parse(""), None);
        // Case matters on the wire.
        assert_eq!(Role::parse("Admin"), None);
    }

    #[test]
    fn admin_flags_stay_disjoint() {
        let admin = RoleFlags::from_role(Some(Role::Admin));
        assert!(admin.is_admin && !admin.is_super_admin);

        let sup = RoleFlags::from_role(Some(Role::SuperAdmin));
        assert!(sup.is_super_admin && !sup.is_admin);
    }

    #[test]
    fn absent_role_yields_no_capabilities() {
        assert_eq!(RoleFlags::from_role(None), RoleFlags::default());
    }
}
