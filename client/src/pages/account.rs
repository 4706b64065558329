//! Signed-in customer's account summary with sign-out.

use leptos::prelude::*;
use leptos_router::NavigateOptions;
use leptos_router::hooks::use_navigate;

use crate::state::auth::{use_auth, use_session_store};

#[component]
pub fn AccountPage() -> impl IntoView {
    let auth = use_auth();
    let store = use_session_store();
    let navigate = use_navigate();
    let error = RwSignal::new(None::<String>);

    let on_sign_out = move |_| {
        let store = store.clone();
        let navigate = navigate.clone();
        leptos::task::spawn_local(async move {
            match store.sign_out().await {
                Ok(()) => navigate("/", NavigateOptions::default()),
                Err(err) => error.set(Some(err.to_string())),
            }
        });
    };

    let name = move || auth.with(|s| s.display_name().unwrap_or_default().to_owned());
    let email = move || auth.with(|s| s.user.as_ref().and_then(|u| u.email.clone()).unwrap_or_default());
    let phone = move || auth.with(|s| s.profile.as_ref().and_then(|p| p.phone.clone()));

    view! {
        <div class="account-page">
            <h1>"My account"</h1>
            <dl class="account-page__details">
                <dt>"Name"</dt>
                <dd>{name}</dd>
                <dt>"Email"</dt>
                <dd>{email}</dd>
                <Show when=move || phone().is_some()>
                    <dt>"Phone"</dt>
                    <dd>{move || phone().unwrap_or_default()}</dd>
                </Show>
            </dl>
            <button class="auth-button" on:click=on_sign_out>"Sign out"</button>
            <Show when=move || error.get().is_some()>
                <p class="auth-message">{move || error.get().unwrap_or_default()}</p>
            </Show>
        </div>
    }
}
