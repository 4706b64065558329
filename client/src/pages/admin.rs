//! Admin landing page, reachable only through `AdminRoute`.

use leptos::prelude::*;

use crate::state::auth::use_auth;

#[component]
pub fn AdminPage() -> impl IntoView {
    let auth = use_auth();
    let name = move || auth.with(|s| s.display_name().unwrap_or("admin").to_owned());

    view! {
        <div class="admin-page">
            <h1>"Admin"</h1>
            <p>"Signed in as " {name}</p>
        </div>
    }
}
