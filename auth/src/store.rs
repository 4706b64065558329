//! Session Store and Auth Gateway.
//!
//! ARCHITECTURE
//! ============
//! `SessionStore` is constructed once at application start and disposed at
//! shutdown. Construction returns a driver future that runs two activities
//! concurrently: the one-shot session probe and the provider event loop.
//! Both funnel every state change through `AuthViewState::apply`, and the
//! result is published on a `watch` channel for UI layers to observe.
//!
//! ORDERING
//! ========
//! Each accepted provider event (and a successful sign-out) advances an
//! epoch. Writes from the probe and from profile lookups carry the epoch they
//! started under and are dropped if it has moved on, so the event stream
//! always wins over the probe and a late profile response cannot resurrect a
//! signed-out session. After `shutdown` no write is accepted at all.
//!
//! ERROR HANDLING
//! ==============
//! `connection_error` is set only when the initial probe fails or when an
//! action cannot reach the provider. Profile lookup failures are logged and
//! otherwise swallowed; the session stays valid without a profile.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::{AuthConfig, DEFAULT_REDIRECT_URL};
use crate::error::{ActionError, ErrorCode, ProviderError};
use crate::provider::{IdentityProvider, ProfileStore, Subscription};
use crate::types::{AuthEvent, AuthResponse, Identity, NewProfile, OAuthRedirect, Profile, Session};

/// Shown when the identity provider cannot be reached at all.
pub const CONNECTION_ERROR_MESSAGE: &str =
    "Unable to connect to the authentication service. Please check your internet connection and try again.";

const MISSING_CREDENTIALS: &str = "Email and password are required";
const MISSING_NAME: &str = "Name is required for registration";
const MISSING_OAUTH_PROVIDER: &str = "An OAuth provider is required";
const MISSING_OAUTH_CODE: &str = "An authorization code is required";

/// The probe always runs under the epoch the store was created with.
const PROBE_EPOCH: u64 = 0;

// =============================================================================
// VIEW STATE
// =============================================================================

/// Derived, in-memory authentication state exposed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthViewState {
    pub user: Option<Identity>,
    pub profile: Option<Profile>,
    pub is_authenticated: bool,
    pub is_admin: bool,
    pub loading: bool,
    pub connection_error: Option<String>,
}

impl Default for AuthViewState {
    fn default() -> Self {
        Self {
            user: None,
            profile: None,
            is_authenticated: false,
            is_admin: false,
            loading: true,
            connection_error: None,
        }
    }
}

/// Every way the view state can change.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The initial probe could not reach the provider.
    ProbeFailed(String),
    /// A session became present (`Some`) or absent (`None`).
    SessionResolved(Option<Identity>),
    /// The profile lookup finished; `None` means no row exists yet.
    ProfileResolved(Option<Profile>),
    /// The profile lookup failed for a reason other than "not found".
    ProfileFailed,
    SignedOut,
    ActionStarted,
    ConnectionLost(String),
}

impl AuthViewState {
    /// Reduce one transition into the state.
    pub fn apply(&mut self, transition: &Transition) {
        match transition {
            Transition::ProbeFailed(message) => {
                self.user = None;
                self.is_authenticated = false;
                self.connection_error = Some(message.clone());
                self.loading = false;
            }
            Transition::SessionResolved(Some(user)) => {
                if self.profile.as_ref().is_some_and(|p| p.id != user.id) {
                    self.profile = None;
                    self.is_admin = false;
                }
                self.user = Some(user.clone());
                self.is_authenticated = true;
                self.connection_error = None;
            }
            Transition::SessionResolved(None) => {
                self.user = None;
                self.profile = None;
                self.is_authenticated = false;
                self.is_admin = false;
                self.connection_error = None;
                self.loading = false;
            }
            Transition::ProfileResolved(profile) => {
                self.is_admin = profile.as_ref().is_some_and(|p| p.is_admin);
                self.profile = profile.clone();
                self.loading = false;
            }
            Transition::ProfileFailed => {
                self.loading = false;
            }
            Transition::SignedOut => {
                self.user = None;
                self.profile = None;
                self.is_authenticated = false;
                self.is_admin = false;
                self.connection_error = None;
                self.loading = false;
            }
            Transition::ActionStarted => {
                self.connection_error = None;
            }
            Transition::ConnectionLost(message) => {
                self.connection_error = Some(message.clone());
            }
        }
    }

    /// Best name to greet the user with: profile name, sign-up name, then email.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.profile
            .as_ref()
            .map(|p| p.name.as_str())
            .filter(|name| !name.trim().is_empty())
            .or_else(|| self.user.as_ref().and_then(Identity::display_name))
            .or_else(|| self.user.as_ref().and_then(|u| u.email.as_deref()))
    }
}

// =============================================================================
// OPTIONS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Where OAuth providers send the browser back to.
    pub redirect_url: String,
}

impl StoreOptions {
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self { redirect_url: config.redirect_url.clone() }
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self { redirect_url: DEFAULT_REDIRECT_URL.to_owned() }
    }
}

// =============================================================================
// SHARED STATE
// =============================================================================

#[derive(Debug)]
struct Gate {
    alive: bool,
    epoch: u64,
}

struct Shared {
    state: watch::Sender<AuthViewState>,
    gate: Mutex<Gate>,
    running: watch::Sender<bool>,
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    options: StoreOptions,
}

impl Shared {
    /// Apply `transition` if the store is alive and, when given, the epoch
    /// still matches. Returns whether the write happened.
    fn write(&self, expected_epoch: Option<u64>, transition: Transition) -> bool {
        let Ok(gate) = self.gate.lock() else {
            return false;
        };
        if !gate.alive || expected_epoch.is_some_and(|epoch| epoch != gate.epoch) {
            return false;
        }
        debug!(?transition, epoch = gate.epoch, "auth view-state transition");
        self.state.send_modify(|state| state.apply(&transition));
        true
    }

    /// Advance the epoch and apply `transition` atomically.
    fn advance(&self, transition: Transition) -> Option<u64> {
        let Ok(mut gate) = self.gate.lock() else {
            return None;
        };
        if !gate.alive {
            return None;
        }
        gate.epoch += 1;
        debug!(?transition, epoch = gate.epoch, "auth view-state transition");
        self.state.send_modify(|state| state.apply(&transition));
        Some(gate.epoch)
    }

    /// Mark the store dead. Returns `true` the first time only.
    fn kill(&self) -> bool {
        match self.gate.lock() {
            Ok(mut gate) => std::mem::replace(&mut gate.alive, false),
            Err(_) => false,
        }
    }

    fn is_alive(&self) -> bool {
        self.gate.lock().is_ok_and(|gate| gate.alive)
    }
}

// =============================================================================
// STORE
// =============================================================================

struct Handle {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Handle {
    fn shutdown(&self) {
        if self.shared.kill() {
            self.shared.running.send_replace(false);
            info!("session store shut down");
        }
        if let Ok(mut task) = self.task.lock() {
            if let Some(task) = task.take() {
                task.abort();
            }
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Explicitly constructed session manager. Cheap to clone; the last clone
/// to drop shuts the store down.
#[derive(Clone)]
pub struct SessionStore {
    handle: Arc<Handle>,
}

impl SessionStore {
    /// Build a store and the driver future that bootstraps and follows the
    /// provider. The caller decides which executor runs the driver.
    ///
    /// The event subscription is taken here, before the probe can start, so
    /// no event emitted during bootstrap is missed.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        options: StoreOptions,
    ) -> (Self, impl Future<Output = ()> + Send + 'static) {
        let (state, _) = watch::channel(AuthViewState::default());
        let subscription = provider.subscribe();
        let shared = Arc::new(Shared {
            state,
            gate: Mutex::new(Gate { alive: true, epoch: PROBE_EPOCH }),
            running: watch::Sender::new(true),
            provider,
            profiles,
            options,
        });
        let driver = drive(Arc::clone(&shared), subscription);
        let store = Self { handle: Arc::new(Handle { shared, task: Mutex::new(None) }) };
        (store, driver)
    }

    /// Build a store and run its driver on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn start(provider: Arc<dyn IdentityProvider>, profiles: Arc<dyn ProfileStore>, options: StoreOptions) -> Self {
        let (store, driver) = Self::new(provider, profiles, options);
        let task = tokio::spawn(driver);
        if let Ok(mut slot) = store.handle.task.lock() {
            *slot = Some(task);
        }
        store
    }

    /// Stop following the provider. State stays readable but frozen.
    pub fn shutdown(&self) {
        self.handle.shutdown();
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.shared.is_alive()
    }

    #[must_use]
    pub fn snapshot(&self) -> AuthViewState {
        self.handle.shared.state.borrow().clone()
    }

    /// Receiver that observes every published state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthViewState> {
        self.handle.shared.state.subscribe()
    }

    /// Wait until the initial load has settled and return that state.
    ///
    /// Returns the frozen snapshot, possibly still loading, if the store is
    /// shut down first.
    pub async fn settled(&self) -> AuthViewState {
        let mut state = self.subscribe();
        let mut running = self.handle.shared.running.subscribe();
        tokio::select! {
            settled = async { state.wait_for(|state| !state.loading).await.ok().map(|s| s.clone()) } => {
                settled.unwrap_or_else(|| self.snapshot())
            }
            () = stopped(&mut running) => self.snapshot(),
        }
    }

    fn shared(&self) -> &Shared {
        &self.handle.shared
    }

    // -------------------------------------------------------------------------
    // ACTIONS
    // -------------------------------------------------------------------------

    /// Password sign-in. The resulting session reaches the view state through
    /// the provider's event stream, not through this call.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Invalid` for empty credentials and
    /// `ActionError::Provider` when the provider rejects or cannot be reached.
    pub async fn sign_in_with_email(&self, email: &str, password: &str) -> Result<AuthResponse, ActionError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ActionError::Invalid(MISSING_CREDENTIALS));
        }
        self.begin_action();
        match self.shared().provider.sign_in_with_password(email, password).await {
            Ok(response) => {
                info!(email = ?response.user.as_ref().and_then(|u| u.email.as_deref()), "sign in successful");
                Ok(response)
            }
            Err(err) => Err(self.fail_action("sign_in", err)),
        }
    }

    /// Register an account, then write its profile row as a best-effort
    /// side effect. A failed profile write is logged and does not fail the
    /// sign-up.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Invalid` for empty fields and
    /// `ActionError::Provider` when registration itself fails.
    pub async fn sign_up_with_email(&self, email: &str, password: &str, name: &str) -> Result<AuthResponse, ActionError> {
        let email = email.trim();
        let name = name.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ActionError::Invalid(MISSING_CREDENTIALS));
        }
        if name.is_empty() {
            return Err(ActionError::Invalid(MISSING_NAME));
        }
        self.begin_action();
        let response = match self.shared().provider.sign_up(email, password, name).await {
            Ok(response) => response,
            Err(err) => return Err(self.fail_action("sign_up", err)),
        };

        if let Some(user) = &response.user {
            let row_email = user.email.clone().unwrap_or_else(|| email.to_owned());
            let profile = NewProfile::customer(user.id, row_email, name);
            if let Err(err) = self.shared().profiles.insert_profile(&profile).await {
                error!(user_id = %user.id, error = %err, code = err.error_code(), "profile creation failed");
            }
        }

        info!(email = ?response.user.as_ref().and_then(|u| u.email.as_deref()), "sign up successful");
        Ok(response)
    }

    /// Start a redirect-based sign-in. The session arrives later through the
    /// event stream once the browser comes back.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Provider` when the redirect cannot be prepared.
    pub async fn sign_in_with_oauth(&self, provider: &str) -> Result<OAuthRedirect, ActionError> {
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(ActionError::Invalid(MISSING_OAUTH_PROVIDER));
        }
        self.begin_action();
        let redirect_to = self.shared().options.redirect_url.clone();
        match self.shared().provider.sign_in_with_oauth(provider, &redirect_to).await {
            Ok(redirect) => {
                info!(provider, redirect_to = %redirect_to, "oauth redirect prepared");
                Ok(redirect)
            }
            Err(err) => Err(self.fail_action("oauth", err)),
        }
    }

    /// Finish a redirect-based sign-in with the code from the callback URL.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Provider` when the exchange is rejected or the
    /// provider cannot be reached.
    pub async fn complete_oauth(&self, code: &str) -> Result<Session, ActionError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ActionError::Invalid(MISSING_OAUTH_CODE));
        }
        self.begin_action();
        match self.shared().provider.exchange_code(code).await {
            Ok(session) => {
                info!(email = ?session.user.email, "oauth sign in completed");
                Ok(session)
            }
            Err(err) => Err(self.fail_action("oauth_exchange", err)),
        }
    }

    /// Sign out and clear local state immediately on success.
    ///
    /// # Errors
    ///
    /// Returns `ActionError::Provider` when the provider call fails; the user
    /// and profile are left untouched in that case.
    pub async fn sign_out(&self) -> Result<(), ActionError> {
        self.begin_action();
        match self.shared().provider.sign_out().await {
            Ok(()) => {
                self.shared().advance(Transition::SignedOut);
                info!("signed out");
                Ok(())
            }
            Err(err) => Err(self.fail_action("sign_out", err)),
        }
    }

    fn begin_action(&self) {
        self.shared().write(None, Transition::ActionStarted);
    }

    fn fail_action(&self, action: &'static str, err: ProviderError) -> ActionError {
        if err.is_connection() {
            self.shared()
                .write(None, Transition::ConnectionLost(CONNECTION_ERROR_MESSAGE.to_owned()));
        }
        warn!(action, error = %err, code = err.error_code(), "auth action failed");
        ActionError::Provider(err)
    }
}

// =============================================================================
// DRIVER
// =============================================================================

type ProfileLookup = Pin<Box<dyn Future<Output = ()> + Send>>;

async fn drive(shared: Arc<Shared>, subscription: Subscription) {
    let mut running = shared.running.subscribe();
    tokio::select! {
        () = stopped(&mut running) => {
            debug!("session store driver stopped");
        }
        () = async {
            tokio::join!(probe(Arc::clone(&shared)), follow_events(Arc::clone(&shared), subscription));
        } => {
            debug!("provider event stream closed");
        }
    }
}

/// Resolves once the store has been shut down.
async fn stopped(running: &mut watch::Receiver<bool>) {
    let _ = running.wait_for(|running| !*running).await;
}

async fn probe(shared: Arc<Shared>) {
    match shared.provider.get_session().await {
        Err(err) => {
            error!(error = %err, code = err.error_code(), "initial session probe failed");
            shared.write(Some(PROBE_EPOCH), Transition::ProbeFailed(CONNECTION_ERROR_MESSAGE.to_owned()));
        }
        Ok(None) => {
            debug!("no stored session");
            shared.write(Some(PROBE_EPOCH), Transition::SessionResolved(None));
        }
        Ok(Some(session)) => {
            let user_id = session.user.id;
            if shared.write(Some(PROBE_EPOCH), Transition::SessionResolved(Some(session.user))) {
                resolve_profile(shared, PROBE_EPOCH, user_id).await;
            } else {
                debug!(%user_id, "probe superseded by a newer auth event");
            }
        }
    }
}

enum Step {
    ProfileDone,
    Event(Option<AuthEvent>),
}

async fn follow_events(shared: Arc<Shared>, mut subscription: Subscription) {
    let mut pending: Option<ProfileLookup> = None;
    loop {
        let step = match pending.as_mut() {
            Some(lookup) => tokio::select! {
                () = lookup => Step::ProfileDone,
                event = subscription.recv() => Step::Event(event),
            },
            None => Step::Event(subscription.recv().await),
        };

        let event = match step {
            Step::ProfileDone => {
                pending = None;
                continue;
            }
            Step::Event(None) => break,
            Step::Event(Some(event)) => event,
        };

        // A newer event makes any in-flight lookup stale.
        pending = None;
        let session = event.session();
        info!(event = event.kind(), email = ?session.and_then(|s| s.user.email.as_deref()), "auth state changed");

        let user = session.map(|s| s.user.clone());
        let user_id = user.as_ref().map(|u| u.id);
        let Some(epoch) = shared.advance(Transition::SessionResolved(user)) else {
            break;
        };
        if let Some(user_id) = user_id {
            pending = Some(Box::pin(resolve_profile(Arc::clone(&shared), epoch, user_id)));
        }
    }
    subscription.unsubscribe();

    if let Some(lookup) = pending {
        lookup.await;
    }
}

async fn resolve_profile(shared: Arc<Shared>, epoch: u64, user_id: Uuid) {
    let transition = match shared.profiles.fetch_profile(user_id).await {
        Ok(Some(profile)) => Transition::ProfileResolved(Some(profile)),
        Ok(None) => {
            debug!(%user_id, "no profile row yet");
            Transition::ProfileResolved(None)
        }
        Err(err) => {
            error!(%user_id, error = %err, code = err.error_code(), "error fetching user profile");
            Transition::ProfileFailed
        }
    };
    if !shared.write(Some(epoch), transition) {
        debug!(%user_id, epoch, "discarding stale profile response");
    }
}
