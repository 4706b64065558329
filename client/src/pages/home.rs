//! Storefront landing page and OAuth return target.
//!
//! The identity provider sends the browser back here with `?code=...`. The
//! code is exchanged exactly once, after which the query string is dropped
//! from the URL. The resulting session reaches the page through the store's
//! event stream like any other sign-in.

#[cfg(test)]
#[path = "home_test.rs"]
mod home_test;

use leptos::prelude::*;
use leptos_router::NavigateOptions;
use leptos_router::hooks::{use_navigate, use_query_map};

use crate::state::auth::{use_auth, use_session_store};

pub const OAUTH_CODE_PARAM: &str = "code";

/// The authorization code to exchange, if the callback carried one.
#[must_use]
pub fn pending_oauth_code(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_owned()).filter(|c| !c.is_empty())
}

#[component]
pub fn HomePage() -> impl IntoView {
    let auth = use_auth();
    let store = use_session_store();
    let query = use_query_map();
    let navigate = use_navigate();
    let exchanged = RwSignal::new(false);
    let oauth_error = RwSignal::new(None::<String>);

    Effect::new(move || {
        if exchanged.get_untracked() {
            return;
        }
        let Some(code) = pending_oauth_code(query.with(|q| q.get(OAUTH_CODE_PARAM))) else {
            return;
        };
        exchanged.set(true);
        let store = store.clone();
        let navigate = navigate.clone();
        leptos::task::spawn_local(async move {
            if let Err(err) = store.complete_oauth(&code).await {
                oauth_error.set(Some(err.to_string()));
            }
            navigate("/home", NavigateOptions { replace: true, ..NavigateOptions::default() });
        });
    });

    let greeting = move || {
        auth.with(|s| match s.display_name() {
            Some(name) if s.is_authenticated => format!("Welcome back, {name}!"),
            _ => "Fresh groceries from your village.".to_owned(),
        })
    };

    view! {
        <div class="home-page">
            <h1>"Village Fresh"</h1>
            <p class="home-page__greeting">{greeting}</p>
            <Show when=move || oauth_error.get().is_some()>
                <p class="auth-message">{move || oauth_error.get().unwrap_or_default()}</p>
            </Show>
            <nav class="home-page__links">
                <Show
                    when=move || auth.with(|s| s.is_authenticated)
                    fallback=|| view! { <a href="/auth">"Sign in"</a> }
                >
                    <a href="/account">"My account"</a>
                </Show>
                <Show when=move || auth.with(|s| s.is_admin)>
                    <a href="/admin">"Admin"</a>
                </Show>
            </nav>
        </div>
    }
}
