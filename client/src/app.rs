//! Root application component with routing and context providers.

use auth::SessionStore;
use leptos::prelude::*;
use leptos_meta::{Title, provide_meta_context};
use leptos_router::{
    StaticSegment,
    components::{Route, Router, Routes},
};

use crate::components::connection_banner::ConnectionBanner;
use crate::components::route_guard::{AdminRoute, PrivateRoute};
use crate::pages::{account::AccountPage, admin::AdminPage, auth::AuthPage, home::HomePage};
use crate::state::auth::provide_auth;

/// Root application component.
///
/// Takes ownership of a running `SessionStore`; the store is shut down when
/// this component's owner is cleaned up.
#[component]
pub fn App(store: SessionStore) -> impl IntoView {
    provide_meta_context();
    provide_auth(store);

    view! {
        <Title text="Village Fresh"/>
        <ConnectionBanner/>

        <Router>
            <Routes fallback=|| "Page not found.".into_view()>
                <Route path=StaticSegment("") view=HomePage/>
                <Route path=StaticSegment("home") view=HomePage/>
                <Route path=StaticSegment("auth") view=AuthPage/>
                <Route
                    path=StaticSegment("account")
                    view=|| view! { <PrivateRoute><AccountPage/></PrivateRoute> }
                />
                <Route
                    path=StaticSegment("admin")
                    view=|| view! { <AdminRoute><AdminPage/></AdminRoute> }
                />
            </Routes>
        </Router>
    }
}
