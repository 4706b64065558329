//! Seams between the session store and the hosted backend.
//!
//! DESIGN
//! ======
//! The store only ever holds `Arc<dyn IdentityProvider>` and
//! `Arc<dyn ProfileStore>`, so the HTTP client and the test doubles are
//! interchangeable. Provider events travel over a `broadcast` channel: each
//! `Subscription` is an independent receiver that ends when dropped.

#[cfg(test)]
#[path = "provider_test.rs"]
mod provider_test;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;
use uuid::Uuid;

use crate::error::ProviderError;
use crate::types::{AuthEvent, AuthResponse, NewProfile, OAuthRedirect, Profile, Session};

const DEFAULT_EVENT_CAPACITY: usize = 32;

// =============================================================================
// TRAITS
// =============================================================================

/// Identity and session operations offered by the backend.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current session, restoring a persisted one if needed.
    async fn get_session(&self) -> Result<Option<Session>, ProviderError>;

    /// Subscribe to sign-in, sign-out, and token-refresh events.
    fn subscribe(&self) -> Subscription;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<AuthResponse, ProviderError>;

    /// Register a new account. `name` is stored in the identity metadata.
    async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<AuthResponse, ProviderError>;

    /// Start a redirect-based sign-in with an external provider.
    async fn sign_in_with_oauth(&self, provider: &str, redirect_to: &str) -> Result<OAuthRedirect, ProviderError>;

    /// Finish a redirect-based sign-in with the code handed back by the provider.
    async fn exchange_code(&self, code: &str) -> Result<Session, ProviderError>;

    async fn sign_out(&self) -> Result<(), ProviderError>;
}

/// Keyed access to the storefront `users` table.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    /// Look up a profile. A missing row is `Ok(None)`, not an error.
    async fn fetch_profile(&self, id: Uuid) -> Result<Option<Profile>, ProviderError>;

    async fn insert_profile(&self, profile: &NewProfile) -> Result<(), ProviderError>;
}

// =============================================================================
// EVENTS
// =============================================================================

/// Sender side of the provider event stream.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<AuthEvent>,
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription { rx: self.tx.subscribe() }
    }

    /// Publish an event, returning how many subscribers received it.
    pub fn emit(&self, event: AuthEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to provider events. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    rx: broadcast::Receiver<AuthEvent>,
}

impl Subscription {
    /// Next event, or `None` once the provider is gone.
    ///
    /// A subscriber that falls behind skips to the oldest retained event.
    pub async fn recv(&mut self) -> Option<AuthEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth event subscriber lagged; skipping ahead");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(self) {}
}
