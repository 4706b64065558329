//! Identity API client.
//!
//! DESIGN
//! ======
//! The in-memory session lives in the shared `TokenSource`; `SessionStorage`
//! mirrors it so a restart can restore the user. Every state change that
//! the store must hear about is broadcast on the `EventHub` after the
//! session has been updated locally, so subscribers never observe an event
//! ahead of the data behind it.
//!
//! `refresh_lock` serializes refreshes with sign-out. A refresh only adopts
//! its result while a session is still installed, so a sign-out can never be
//! undone by a refresh response that lands after it.
//!
//! TRADE-OFFS
//! ==========
//! Only a rejected refresh clears an expired session. A transport failure
//! during refresh surfaces as an error and keeps the stored session so a
//! later probe can retry once the network is back.

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod gotrue_test;

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pkce::PkcePair;
use super::wire::{self, PasswordGrant, PkceGrant, RefreshGrant, SignUpData, SignUpRequest};
use super::{TokenSource, read_success};
use crate::config::AuthConfig;
use crate::error::{ErrorCode, ProviderError};
use crate::provider::{EventHub, IdentityProvider, Subscription};
use crate::storage::SessionStorage;
use crate::types::{AuthEvent, AuthResponse, OAuthRedirect, Session, unix_now};

/// Upper bound on how long the refresher sleeps before looking again.
const REFRESH_TICK_SECS: u64 = 30;
/// Back-off after a refresh attempt that could not reach the backend.
const REFRESH_RETRY_SECS: u64 = 5;

pub struct GoTrueClient {
    http: reqwest::Client,
    config: AuthConfig,
    storage: Arc<dyn SessionStorage>,
    tokens: TokenSource,
    hub: EventHub,
    pending_verifier: Mutex<Option<String>>,
    refresh_lock: tokio::sync::Mutex<()>,
}

impl GoTrueClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        config: AuthConfig,
        storage: Arc<dyn SessionStorage>,
        tokens: TokenSource,
    ) -> Self {
        Self {
            http,
            config,
            storage,
            tokens,
            hub: EventHub::new(),
            pending_verifier: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenSource {
        &self.tokens
    }

    /// Whether an OAuth redirect was prepared and is waiting for its code.
    #[must_use]
    pub fn has_pending_oauth(&self) -> bool {
        self.pending_verifier.lock().is_ok_and(|v| v.is_some())
    }

    // -------------------------------------------------------------------------
    // SESSION BOOKKEEPING
    // -------------------------------------------------------------------------

    fn refresh_margin(&self) -> i64 {
        i64::try_from(self.config.refresh_margin_secs).unwrap_or(i64::MAX)
    }

    /// Current session from memory, falling back to persisted storage.
    fn current_session(&self) -> Option<Session> {
        if let Some(session) = self.tokens.session() {
            return Some(session);
        }
        match self.storage.load() {
            Ok(Some(session)) => {
                debug!(user_id = %session.user.id, "restored persisted session");
                self.tokens.set(Some(session.clone()));
                Some(session)
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "could not read persisted session");
                None
            }
        }
    }

    /// Install `session` locally, then announce it.
    fn adopt(&self, session: &Session, event: fn(Session) -> AuthEvent) {
        self.tokens.set(Some(session.clone()));
        if let Err(err) = self.storage.save(session) {
            warn!(error = %err, code = err.error_code(), "could not persist session");
        }
        self.hub.emit(event(session.clone()));
    }

    /// Drop the session locally, then announce the sign-out.
    fn forget(&self) {
        self.tokens.set(None);
        if let Err(err) = self.storage.clear() {
            warn!(error = %err, code = err.error_code(), "could not clear persisted session");
        }
        self.hub.emit(AuthEvent::SignedOut);
    }

    // -------------------------------------------------------------------------
    // HTTP
    // -------------------------------------------------------------------------

    async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<String, ProviderError> {
        let response = self
            .http
            .post(self.config.auth_endpoint(path))
            .bearer_auth(&self.config.anon_key)
            .json(body)
            .send()
            .await?;
        read_success(response).await
    }

    async fn token_grant<B: Serialize + Sync>(&self, grant_type: &str, body: &B) -> Result<Session, ProviderError> {
        let text = self.post_json(&format!("token?grant_type={grant_type}"), body).await?;
        wire::parse_session(&text, unix_now())
    }

    /// Exchange a refresh token for a new session and announce it.
    ///
    /// Concurrent callers holding the same stale token share one request:
    /// whoever arrives second finds the session already replaced.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::NotSignedIn` when no session is installed
    /// (before the request, or by the time it answers),
    /// `ProviderError::Api` when the refresh token is rejected and
    /// `ProviderError::Transport` when the backend is unreachable.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Session, ProviderError> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.tokens.session().ok_or(ProviderError::NotSignedIn)?;
        if current.refresh_token != refresh_token {
            return Ok(current);
        }
        let session = self
            .token_grant("refresh_token", &RefreshGrant { refresh_token })
            .await?;
        if self.tokens.session().is_none() {
            debug!(user_id = %session.user.id, "session cleared during refresh; discarding result");
            return Err(ProviderError::NotSignedIn);
        }
        info!(user_id = %session.user.id, expires_at = ?session.expires_at, "session refreshed");
        self.adopt(&session, AuthEvent::TokenRefreshed);
        Ok(session)
    }

    /// Refresh `session` if it is inside the refresh margin.
    ///
    /// A rejected refresh clears the session and reports `Ok(None)`.
    async fn ensure_fresh(&self, session: Session) -> Result<Option<Session>, ProviderError> {
        if !session.is_expired(unix_now(), self.refresh_margin()) {
            return Ok(Some(session));
        }
        match self.refresh(&session.refresh_token).await {
            Ok(fresh) => Ok(Some(fresh)),
            Err(err @ ProviderError::Api { .. }) => {
                warn!(user_id = %session.user.id, error = %err, "refresh rejected; clearing session");
                self.forget();
                Ok(None)
            }
            Err(ProviderError::NotSignedIn) => Ok(None),
            Err(err) => Err(err),
        }
    }

    // -------------------------------------------------------------------------
    // AUTO REFRESH
    // -------------------------------------------------------------------------

    /// Keep the session fresh in the background.
    ///
    /// The task sleeps until `expires_at - refresh_margin` (never longer than
    /// a tick, so sessions created later are picked up) and exits once the
    /// client is dropped.
    pub fn spawn_auto_refresh(client: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(client);
        tokio::spawn(auto_refresh_loop(weak))
    }

    /// One refresher iteration. Returns how long to sleep before the next.
    async fn refresh_tick(&self) -> Duration {
        let now = unix_now();
        let margin = self.refresh_margin();
        let Some(session) = self.tokens.session() else {
            return Duration::from_secs(REFRESH_TICK_SECS);
        };
        if !session.is_expired(now, margin) {
            let wait = session
                .refresh_in(now, margin)
                .map_or(REFRESH_TICK_SECS, |secs| secs.clamp(1, REFRESH_TICK_SECS));
            return Duration::from_secs(wait);
        }

        match self.refresh(&session.refresh_token).await {
            Ok(_) => Duration::from_secs(1),
            Err(err @ ProviderError::Api { .. }) => {
                warn!(user_id = %session.user.id, error = %err, "background refresh rejected; signing out");
                self.forget();
                Duration::from_secs(REFRESH_TICK_SECS)
            }
            Err(ProviderError::NotSignedIn) => Duration::from_secs(REFRESH_TICK_SECS),
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "background refresh failed; retrying");
                Duration::from_secs(REFRESH_RETRY_SECS)
            }
        }
    }
}

async fn auto_refresh_loop(client: Weak<GoTrueClient>) {
    debug!("auto refresh started");
    loop {
        let Some(strong) = client.upgrade() else {
            break;
        };
        let wait = strong.refresh_tick().await;
        drop(strong);
        tokio::time::sleep(wait).await;
    }
    debug!("auto refresh stopped");
}

// =============================================================================
// PROVIDER
// =============================================================================

#[async_trait]
impl IdentityProvider for GoTrueClient {
    async fn get_session(&self) -> Result<Option<Session>, ProviderError> {
        match self.current_session() {
            Some(session) => self.ensure_fresh(session).await,
            None => Ok(None),
        }
    }

    fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, ProviderError> {
        let session = self
            .token_grant("password", &PasswordGrant { email, password })
            .await?;
        self.adopt(&session, AuthEvent::SignedIn);
        Ok(AuthResponse::from_session(session))
    }

    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<AuthResponse, ProviderError> {
        let body = SignUpRequest { email, password, data: SignUpData { name } };
        let text = self.post_json("signup", &body).await?;
        let response = wire::parse_sign_up(&text, unix_now())?;
        match &response.session {
            Some(session) => self.adopt(session, AuthEvent::SignedIn),
            None => debug!(email, "sign up pending email confirmation"),
        }
        Ok(response)
    }

    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<OAuthRedirect, ProviderError> {
        let pair = PkcePair::generate();
        let url = wire::authorize_url(&self.config.url, provider, redirect_to, &pair.challenge)?;
        if let Ok(mut pending) = self.pending_verifier.lock() {
            *pending = Some(pair.verifier);
        }
        Ok(OAuthRedirect { provider: provider.to_owned(), url })
    }

    async fn exchange_code(&self, code: &str) -> Result<Session, ProviderError> {
        let verifier = self
            .pending_verifier
            .lock()
            .ok()
            .and_then(|mut pending| pending.take())
            .ok_or(ProviderError::NoPendingOAuth)?;
        let session = self
            .token_grant("pkce", &PkceGrant { auth_code: code, code_verifier: &verifier })
            .await?;
        self.adopt(&session, AuthEvent::SignedIn);
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), ProviderError> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(session) = self.current_session() {
            let response = self
                .http
                .post(self.config.auth_endpoint("logout"))
                .bearer_auth(&session.access_token)
                .send()
                .await?;
            match read_success(response).await {
                Ok(_) => {}
                Err(ProviderError::Api { status: 401 | 403 | 404, .. }) => {
                    debug!("session already invalid on the backend");
                }
                Err(err) => return Err(err),
            }
        }
        self.forget();
        Ok(())
    }
}
