//! Identity, session, and profile types shared across the crate.
//!
//! DESIGN
//! ======
//! `Identity` and `Session` mirror the provider's JSON so they round-trip
//! through persisted storage untouched. `Profile` mirrors a row of the
//! application's `users` table, which is owned by the storefront rather than
//! the identity provider.

#[cfg(test)]
#[path = "types_test.rs"]
mod types_test;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata key the sign-up flow stores the display name under.
pub const NAME_METADATA_KEY: &str = "name";

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated account as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Free-form data supplied at registration (holds `name`).
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
    /// Provider-managed data (sign-in provider list and similar).
    #[serde(default)]
    pub app_metadata: HashMap<String, serde_json::Value>,
}

impl Identity {
    /// Display name supplied at sign-up, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.user_metadata
            .get(NAME_METADATA_KEY)
            .and_then(serde_json::Value::as_str)
            .filter(|name| !name.trim().is_empty())
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Token bundle proving an authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Lifetime in seconds, as issued.
    #[serde(default)]
    pub expires_in: i64,
    /// Absolute expiry in unix seconds. Filled from `expires_in` when absent.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: Identity,
}

fn default_token_type() -> String {
    "bearer".to_owned()
}

impl Session {
    /// Fill `expires_at` from `expires_in` when the provider omitted it.
    #[must_use]
    pub fn with_expiry_from(mut self, now: i64) -> Self {
        if self.expires_at.is_none() && self.expires_in > 0 {
            self.expires_at = Some(now + self.expires_in);
        }
        self
    }

    /// True when the session expires within `margin_secs` of `now`.
    /// Sessions without a known expiry never count as expired.
    #[must_use]
    pub fn is_expired(&self, now: i64, margin_secs: i64) -> bool {
        self.expires_at.is_some_and(|at| at - margin_secs <= now)
    }

    /// Seconds until the session should be refreshed, clamped at zero.
    #[must_use]
    pub fn refresh_in(&self, now: i64, margin_secs: i64) -> Option<u64> {
        self.expires_at
            .map(|at| u64::try_from(at - margin_secs - now).unwrap_or(0))
    }
}

/// Current time in unix seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}

// =============================================================================
// PROFILE
// =============================================================================

/// A row of the storefront `users` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// Insert payload written right after a successful sign-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_admin: bool,
}

impl NewProfile {
    /// Profile for a freshly registered, non-admin account.
    #[must_use]
    pub fn customer(id: Uuid, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id, email: email.into(), name: name.into(), is_admin: false }
    }
}

// =============================================================================
// EVENTS AND RESPONSES
// =============================================================================

/// Authentication events pushed by the provider.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
}

impl AuthEvent {
    /// Session carried by the event, `None` for sign-out.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::SignedIn(session) | Self::TokenRefreshed(session) => Some(session),
            Self::SignedOut => None,
        }
    }

    /// Stable name for log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SignedIn(_) => "signed_in",
            Self::SignedOut => "signed_out",
            Self::TokenRefreshed(_) => "token_refreshed",
        }
    }
}

/// Result of a password sign-in or a registration.
///
/// `session` is `None` after a sign-up that still awaits email confirmation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AuthResponse {
    pub user: Option<Identity>,
    pub session: Option<Session>,
}

impl AuthResponse {
    #[must_use]
    pub fn from_session(session: Session) -> Self {
        Self { user: Some(session.user.clone()), session: Some(session) }
    }
}

/// Where the browser must go to start an external sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OAuthRedirect {
    pub provider: String,
    pub url: String,
}
