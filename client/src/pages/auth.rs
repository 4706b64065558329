//! Sign-in / sign-up page with email and Google entry points.
//!
//! Action-level failures (bad credentials, duplicate account) render inline
//! under the form. Connection-level failures surface through the store's
//! `connection_error` and the app-wide banner instead.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use leptos::prelude::*;
use leptos_router::NavigateOptions;
use leptos_router::hooks::use_navigate;

use crate::state::auth::{use_auth, use_session_store};

pub const OAUTH_PROVIDER: &str = "google";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    SignIn,
    SignUp,
}

impl AuthMode {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Self::SignIn => Self::SignUp,
            Self::SignUp => Self::SignIn,
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Self::SignIn => "Welcome back",
            Self::SignUp => "Create your account",
        }
    }

    #[must_use]
    pub fn submit_label(self) -> &'static str {
        match self {
            Self::SignIn => "Sign In",
            Self::SignUp => "Sign Up",
        }
    }

    #[must_use]
    pub fn toggle_label(self) -> &'static str {
        match self {
            Self::SignIn => "Need an account? Sign up",
            Self::SignUp => "Already have an account? Sign in",
        }
    }
}

#[component]
pub fn AuthPage() -> impl IntoView {
    let auth = use_auth();
    let store = use_session_store();
    let navigate = use_navigate();

    let mode = RwSignal::new(AuthMode::SignIn);
    let email = RwSignal::new(String::new());
    let password = RwSignal::new(String::new());
    let name = RwSignal::new(String::new());
    let message = RwSignal::new(String::new());
    let busy = RwSignal::new(false);
    let oauth_url = RwSignal::new(None::<String>);

    // Signed-in visitors have nothing to do here.
    Effect::new(move || {
        if auth.with(|s| !s.loading && s.is_authenticated) {
            navigate("/", NavigateOptions { replace: true, ..NavigateOptions::default() });
        }
    });

    let on_submit = {
        let store = store.clone();
        move |ev: leptos::ev::SubmitEvent| {
            ev.prevent_default();
            if busy.get_untracked() {
                return;
            }
            busy.set(true);
            message.set(String::new());
            let store = store.clone();
            let current = mode.get_untracked();
            let (email_value, password_value, name_value) = (email.get_untracked(), password.get_untracked(), name.get_untracked());
            leptos::task::spawn_local(async move {
                let result = match current {
                    AuthMode::SignIn => store.sign_in_with_email(&email_value, &password_value).await.map(|_| None),
                    AuthMode::SignUp => store
                        .sign_up_with_email(&email_value, &password_value, &name_value)
                        .await
                        .map(|response| response.session.is_none().then_some("Check your email to confirm your account.")),
                };
                match result {
                    Ok(Some(notice)) => message.set(notice.to_owned()),
                    Ok(None) => {}
                    Err(err) => message.set(err.to_string()),
                }
                busy.set(false);
            });
        }
    };

    let on_oauth = move |_| {
        if busy.get_untracked() {
            return;
        }
        busy.set(true);
        let store = store.clone();
        leptos::task::spawn_local(async move {
            match store.sign_in_with_oauth(OAUTH_PROVIDER).await {
                Ok(redirect) => oauth_url.set(Some(redirect.url)),
                Err(err) => message.set(err.to_string()),
            }
            busy.set(false);
        });
    };

    view! {
        <div class="auth-page">
            <div class="auth-card">
                <h1>"Village Fresh"</h1>
                <p class="auth-card__subtitle">{move || mode.get().title()}</p>
                <form class="auth-form" on:submit=on_submit>
                    <Show when=move || mode.get() == AuthMode::SignUp>
                        <input
                            class="auth-input"
                            type="text"
                            placeholder="Full name"
                            prop:value=move || name.get()
                            on:input=move |ev| name.set(event_target_value(&ev))
                        />
                    </Show>
                    <input
                        class="auth-input"
                        type="email"
                        placeholder="you@example.com"
                        prop:value=move || email.get()
                        on:input=move |ev| email.set(event_target_value(&ev))
                    />
                    <input
                        class="auth-input"
                        type="password"
                        placeholder="Password"
                        prop:value=move || password.get()
                        on:input=move |ev| password.set(event_target_value(&ev))
                    />
                    <button class="auth-button" type="submit" disabled=move || busy.get()>
                        {move || mode.get().submit_label()}
                    </button>
                </form>
                <Show when=move || !message.get().is_empty()>
                    <p class="auth-message">{move || message.get()}</p>
                </Show>
                <div class="auth-divider"></div>
                <button class="auth-button auth-button--oauth" on:click=on_oauth disabled=move || busy.get()>
                    "Continue with Google"
                </button>
                <Show when=move || oauth_url.get().is_some()>
                    <a class="auth-button auth-button--oauth" rel="external" href=move || oauth_url.get().unwrap_or_default()>
                        "Open Google sign-in"
                    </a>
                </Show>
                <button class="auth-toggle" on:click=move |_| mode.update(|m| *m = m.toggled())>
                    {move || mode.get().toggle_label()}
                </button>
            </div>
        </div>
    }
}
