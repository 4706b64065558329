//! Route guards for signed-in and admin-only views.
//!
//! DESIGN
//! ======
//! The decision itself lives in `auth::guard`; these components only map a
//! `GuardOutcome` onto a neutral spinner, the guarded children, or a
//! `<Redirect>`. Nothing protected renders while the session is loading.

use auth::{AuthViewState, GuardOutcome, admin_route, private_route};
use leptos::prelude::*;
use leptos_router::components::Redirect;

use crate::state::auth::use_auth;

/// Renders `children` for any signed-in user, else redirects to `/auth`.
#[component]
pub fn PrivateRoute(children: ChildrenFn) -> impl IntoView {
    guarded(use_auth(), private_route, children)
}

/// Renders `children` for signed-in administrators, else redirects to `/`.
#[component]
pub fn AdminRoute(children: ChildrenFn) -> impl IntoView {
    guarded(use_auth(), admin_route, children)
}

/// Placeholder shown while authentication state is still loading.
#[component]
pub fn LoadingSpinner() -> impl IntoView {
    view! {
        <div class="auth-loading" role="status" aria-label="Loading">
            <span class="auth-loading__spinner"></span>
        </div>
    }
}

fn guarded(
    auth: RwSignal<AuthViewState>,
    decide: fn(&AuthViewState) -> GuardOutcome,
    children: ChildrenFn,
) -> impl IntoView {
    move || match auth.with(decide) {
        GuardOutcome::Waiting => view! { <LoadingSpinner/> }.into_any(),
        GuardOutcome::Allow => children().into_any(),
        GuardOutcome::Redirect(path) => view! { <Redirect path=path/> }.into_any(),
    }
}
