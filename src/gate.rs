use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Redirect, Response},
};
use tokio::time::timeout;

use crate::config::AppConfig;
use crate::models::{Identity, Role, RoleFlags};
use crate::role::{RoleResolverState, RoleState};
use crate::session::{SessionState, SessionStoreState};

/// Where denied navigations are sent. The sign-in view is the single redirect
/// target for every protected route.
pub const SIGN_IN_ROUTE: &str = "/login";

/// GateState
///
/// The per-navigation state machine for a protected route. A navigation
/// starts `Unresolved` while the session or a required role is still loading,
/// then settles into exactly one of `Denied` (redirect issued, protected view
/// never rendered) or `Granted` (view renders). Each fresh navigation re-runs
/// the machine from `Unresolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unresolved,
    Denied,
    Granted,
}

/// RoleRequirement
///
/// What a route demands beyond authentication. `AdminOrAbove` is spelled as
/// two explicit flag checks because `is_admin` and `is_super_admin` are
/// disjoint; there is no combined flag to lean on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRequirement {
    /// Any authenticated identity qualifies.
    None,
    Educator,
    /// Admin or super admin, checked as two flags.
    AdminOrAbove,
}

/// RouteRequirement
///
/// The reachability contract of one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRequirement {
    pub requires_auth: bool,
    pub role: RoleRequirement,
}

impl RouteRequirement {
    /// A route reachable by anyone, including anonymous visitors.
    pub fn public() -> Self {
        Self {
            requires_auth: false,
            role: RoleRequirement::None,
        }
    }

    /// A route requiring a signed-in identity, any role.
    pub fn authenticated() -> Self {
        Self {
            requires_auth: true,
            role: RoleRequirement::None,
        }
    }

    /// A route requiring a signed-in identity with a specific role.
    pub fn with_role(role: RoleRequirement) -> Self {
        Self {
            requires_auth: true,
            role,
        }
    }
}

/// evaluate
///
/// The pure transition function of the gate. Given atomic snapshots of the
/// session and role state, decides whether the navigation is still
/// unresolved, must redirect, or may render.
pub fn evaluate(
    session: &SessionState,
    role: &RoleState,
    requirement: &RouteRequirement,
) -> GateState {
    // Unresolved until both the session and the role have settled; an
    // in-flight resolution must never be mistaken for an answer.
    if session.is_loading || role.is_loading {
        return GateState::Unresolved;
    }

    if session.identity.is_none() {
        return if requirement.requires_auth {
            GateState::Denied
        } else {
            GateState::Granted
        };
    }

    let flags = role.flags();
    let satisfied = match requirement.role {
        RoleRequirement::None => true,
        RoleRequirement::Educator => flags.is_educator,
        // Deliberately two checks, matching the disjoint flags.
        RoleRequirement::AdminOrAbove => flags.is_admin || flags.is_super_admin,
    };

    if satisfied {
        GateState::Granted
    } else {
        GateState::Denied
    }
}

/// Granted
///
/// Extractor form of the gate for authenticated routes. Succeeding means the
/// machine reached `Granted`: the handler receives the settled identity and
/// role flags. Any other outcome rejects with a single redirect to the
/// sign-in view before the protected handler can run, so no protected content
/// is ever rendered for a denied navigation.
#[derive(Debug, Clone)]
pub struct Granted {
    pub identity: Identity,
    pub role: Option<Role>,
    pub flags: RoleFlags,
}

/// GateRedirect
///
/// The rejection of the `Granted` extractor: one redirect to `/login`.
#[derive(Debug)]
pub struct GateRedirect;

impl IntoResponse for GateRedirect {
    fn into_response(self) -> Response {
        Redirect::to(SIGN_IN_ROUTE).into_response()
    }
}

impl<S> FromRequestParts<S> for Granted
where
    S: Send + Sync,
    SessionStoreState: FromRef<S>,
    RoleResolverState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = GateRedirect;

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let sessions = SessionStoreState::from_ref(state);
        let roles = RoleResolverState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // The navigation is Unresolved until the session settles. A hung
        // backend fails closed to a denial instead of an infinite spinner
        // masking an auth-required view.
        let session = match timeout(config.resolve_timeout(), sessions.settled()).await {
            Ok(session) => session,
            Err(_) => {
                tracing::warn!("session never settled, denying navigation");
                return Err(GateRedirect);
            }
        };

        let role = roles.resolve(session.identity.as_ref()).await;

        match evaluate(&session, &role, &RouteRequirement::authenticated()) {
            GateState::Granted => match session.identity {
                Some(identity) => Ok(Granted {
                    identity,
                    role: role.role,
                    flags: role.flags(),
                }),
                // Granted without an identity cannot happen for an
                // auth-required route; fail closed anyway.
                None => Err(GateRedirect),
            },
            GateState::Denied | GateState::Unresolved => Err(GateRedirect),
        }
    }
}
