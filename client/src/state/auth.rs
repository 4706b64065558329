//! Reactive bridge from the session store into Leptos.
//!
//! SYSTEM CONTEXT
//! ==============
//! The app root calls `provide_auth` once with a running `SessionStore`.
//! Route guards and auth-aware components then read the mirrored
//! `RwSignal<AuthViewState>` from context and call actions on the store.
//!
//! LIFECYCLE
//! =========
//! Forwarding stops once the signal is disposed with its owner, and the
//! store is shut down in the owner's cleanup, so remounting the root never
//! leaves a second subscriber behind.

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;

use auth::{AuthViewState, SessionStore};
use leptos::prelude::*;
use tokio::sync::watch;
use tracing::debug;

/// Install the auth signal and store into context for the current owner.
pub fn provide_auth(store: SessionStore) -> RwSignal<AuthViewState> {
    let state = RwSignal::new(store.snapshot());
    leptos::task::spawn_local(forward_changes(store.subscribe(), state));

    provide_context(state);
    provide_context(store.clone());
    on_cleanup(move || store.shutdown());
    state
}

/// Copy every published state into `state` until either side goes away.
pub async fn forward_changes(mut rx: watch::Receiver<AuthViewState>, state: RwSignal<AuthViewState>) {
    while rx.changed().await.is_ok() {
        let next = rx.borrow_and_update().clone();
        if state.try_set(next).is_some() {
            debug!("auth signal disposed; forwarding stopped");
            return;
        }
    }
    debug!("session store closed; forwarding stopped");
}

/// Auth state installed by [`provide_auth`].
///
/// # Panics
///
/// Panics when called outside a tree that ran `provide_auth`.
pub fn use_auth() -> RwSignal<AuthViewState> {
    expect_context::<RwSignal<AuthViewState>>()
}

/// Store installed by [`provide_auth`], for calling actions.
///
/// # Panics
///
/// Panics when called outside a tree that ran `provide_auth`.
pub fn use_session_store() -> SessionStore {
    expect_context::<SessionStore>()
}
