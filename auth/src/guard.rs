//! Route guard decisions for protected and admin-only views.
//!
//! SYSTEM CONTEXT
//! ==============
//! Guards are pure readers of `AuthViewState`. They never fetch anything;
//! UI layers map the outcome onto a spinner, the guarded content, or a
//! redirect.

#[cfg(test)]
#[path = "guard_test.rs"]
mod guard_test;

use crate::store::AuthViewState;

/// Authentication entry point for signed-out visitors.
pub const AUTH_ROUTE: &str = "/auth";
/// Storefront root, where non-admins are sent back to.
pub const ROOT_ROUTE: &str = "/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Authentication state is still loading; render nothing protected.
    Waiting,
    Allow,
    Redirect(&'static str),
}

/// Views that need any signed-in user.
#[must_use]
pub fn private_route(state: &AuthViewState) -> GuardOutcome {
    if state.loading {
        GuardOutcome::Waiting
    } else if state.is_authenticated {
        GuardOutcome::Allow
    } else {
        GuardOutcome::Redirect(AUTH_ROUTE)
    }
}

/// Views that need a signed-in administrator.
#[must_use]
pub fn admin_route(state: &AuthViewState) -> GuardOutcome {
    if state.loading {
        GuardOutcome::Waiting
    } else if state.is_authenticated && state.is_admin {
        GuardOutcome::Allow
    } else {
        GuardOutcome::Redirect(ROOT_ROUTE)
    }
}
