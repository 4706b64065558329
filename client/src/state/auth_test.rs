use std::time::Duration;

use leptos::prelude::*;

use super::*;

async fn eventually(check: impl Fn() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn forwarding_mirrors_published_state() {
    let owner = Owner::new();
    owner.set();
    let (tx, rx) = watch::channel(AuthViewState::default());
    let state = RwSignal::new(AuthViewState::default());
    let task = tokio::spawn(forward_changes(rx, state));

    tx.send_modify(|s| {
        s.loading = false;
        s.is_authenticated = true;
    });
    eventually(|| state.with_untracked(|s| s.is_authenticated && !s.loading)).await;

    drop(tx);
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn forwarding_stops_once_signal_is_disposed() {
    let owner = Owner::new();
    owner.set();
    let (tx, rx) = watch::channel(AuthViewState::default());
    let state = RwSignal::new(AuthViewState::default());
    let task = tokio::spawn(forward_changes(rx, state));

    state.dispose();
    tx.send_modify(|s| s.loading = false);
    tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    assert_eq!(tx.receiver_count(), 0);
}

#[test]
fn hooks_read_provided_context() {
    let owner = Owner::new();
    owner.with(|| {
        let state = RwSignal::new(AuthViewState { loading: false, ..AuthViewState::default() });
        provide_context(state);
        assert!(!use_auth().with_untracked(|s| s.loading));
    });
}
