//! Router Module Index
//!
//! Routing is segregated by reachability so access control is applied
//! explicitly at the module level (via Axum layers) rather than per handler.
//!
//! Two modules map to the two reachability classes the application has.

/// Routes reachable by anyone, anonymous visitors included. Read handlers
/// fail to empty states; the sign-in view lives here because it is the
/// gate's redirect target.
pub mod public;

/// Routes behind the authorization gate. Denied navigations are redirected
/// to `/login` before any protected handler runs.
pub mod protected;
