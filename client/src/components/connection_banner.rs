//! Full-width retry prompt for connection-level auth failures.

use leptos::prelude::*;

use crate::state::auth::use_auth;

/// Shown whenever the store reports that the identity provider is unreachable.
#[component]
pub fn ConnectionBanner() -> impl IntoView {
    let auth = use_auth();
    let message = move || auth.with(|s| s.connection_error.clone());

    view! {
        <Show when=move || message().is_some()>
            <div class="connection-banner" role="alert">
                <p class="connection-banner__message">{move || message().unwrap_or_default()}</p>
                <a class="connection-banner__retry" href="/" rel="external">"Retry"</a>
            </div>
        </Show>
    }
}
