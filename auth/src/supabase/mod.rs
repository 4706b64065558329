//! HTTP implementation of the provider seams against a Supabase backend.
//!
//! ARCHITECTURE
//! ============
//! `GoTrueClient` talks to the identity API (`/auth/v1`) and implements
//! `IdentityProvider`. `RestProfiles` talks to the table API (`/rest/v1`) and
//! implements `ProfileStore`. Both share one `reqwest::Client` and one
//! `TokenSource`, so profile reads run as the signed-in user once a session
//! exists and as the anonymous role before that.
//!
//! ERROR HANDLING
//! ==============
//! Requests that never produce a response become `ProviderError::Transport`.
//! Non-2xx responses are decoded by `wire::parse_api_error` into
//! `ProviderError::Api` with the backend's own message.

pub mod gotrue;
pub mod pkce;
pub mod rest;
pub mod wire;


use std::sync::{Arc, RwLock};

use reqwest::header::{HeaderMap, HeaderValue};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AuthConfig;
use crate::error::{ErrorCode, ProviderError};
use crate::provider::IdentityProvider;
use crate::storage::{FileStorage, MemoryStorage, SessionStorage};
use crate::store::{SessionStore, StoreOptions};
use crate::types::Session;

pub use gotrue::GoTrueClient;
pub use rest::RestProfiles;

// =============================================================================
// TOKEN SOURCE
// =============================================================================

/// The current session, shared between the identity and table clients.
#[derive(Debug, Clone, Default)]
pub struct TokenSource {
    current: Arc<RwLock<Option<Session>>>,
}

impl TokenSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.current.read().ok().and_then(|s| s.clone())
    }

    #[must_use]
    pub fn access_token(&self) -> Option<String> {
        self.current
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|s| s.access_token.clone()))
    }

    pub fn set(&self, session: Option<Session>) {
        if let Ok(mut current) = self.current.write() {
            *current = session;
        }
    }
}

// =============================================================================
// HTTP
// =============================================================================

/// Build the shared HTTP client with the headers every request carries.
pub(crate) fn build_http(config: &AuthConfig) -> Result<reqwest::Client, ProviderError> {
    let mut headers = HeaderMap::new();
    headers.insert("apikey", header_value(&config.anon_key)?);
    headers.insert("X-Client-Info", header_value(&config.client_info)?);

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(config.timeouts.request())
        .connect_timeout(config.timeouts.connect())
        .build()
        .map_err(|e| ProviderError::HttpClientBuild(e.to_string()))
}

fn header_value(raw: &str) -> Result<HeaderValue, ProviderError> {
    HeaderValue::from_str(raw).map_err(|e| ProviderError::HttpClientBuild(e.to_string()))
}

/// `Authorization` value: the user's token when signed in, else the anon key.
pub(crate) fn bearer(tokens: &TokenSource, anon_key: &str) -> String {
    let token = tokens.access_token().unwrap_or_else(|| anon_key.to_owned());
    format!("Bearer {token}")
}

/// Read a response into its status and body, mapping non-2xx to `Api`.
pub(crate) async fn read_success(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status().as_u16();
    let text = response.text().await?;
    if wire::is_success(status) {
        Ok(text)
    } else {
        Err(wire::parse_api_error(status, &text))
    }
}

// =============================================================================
// BACKEND
// =============================================================================

/// Result of a backend reachability check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionReport {
    pub auth_reachable: bool,
    pub database_reachable: bool,
    pub has_session: bool,
    pub error: Option<String>,
}

impl ConnectionReport {
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.auth_reachable && self.database_reachable
    }
}

/// Both clients wired to one backend.
pub struct SupabaseBackend {
    pub auth: Arc<GoTrueClient>,
    pub profiles: Arc<RestProfiles>,
    options: StoreOptions,
    auto_refresh: bool,
}

impl SupabaseBackend {
    /// Connect using the storage `config` asks for: a session file when
    /// `session_file` is set, memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::HttpClientBuild` when the HTTP client cannot be
    /// constructed (for example an anon key that is not a valid header).
    pub fn connect(config: &AuthConfig) -> Result<Self, ProviderError> {
        let storage: Arc<dyn SessionStorage> = match &config.session_file {
            Some(path) => Arc::new(FileStorage::new(path)),
            None => Arc::new(MemoryStorage::new()),
        };
        Self::with_storage(config, storage)
    }

    /// # Errors
    ///
    /// See [`SupabaseBackend::connect`].
    pub fn with_storage(config: &AuthConfig, storage: Arc<dyn SessionStorage>) -> Result<Self, ProviderError> {
        let http = build_http(config)?;
        let tokens = TokenSource::new();
        let auth = GoTrueClient::new(http.clone(), config.clone(), storage, tokens.clone());
        let profiles = RestProfiles::new(http, config, tokens);
        info!(url = %config.url, persisted = config.session_file.is_some(), "backend configured");
        Ok(Self {
            auth: Arc::new(auth),
            profiles: Arc::new(profiles),
            options: StoreOptions::from_config(config),
            auto_refresh: config.auto_refresh,
        })
    }

    /// Start a session store on the current Tokio runtime, plus the token
    /// refresher when auto refresh is enabled.
    #[must_use]
    pub fn start_store(&self) -> SessionStore {
        if self.auto_refresh {
            // The refresher holds a weak reference and exits with the client.
            drop(GoTrueClient::spawn_auto_refresh(&self.auth));
        }
        SessionStore::start(self.auth.clone(), self.profiles.clone(), self.options.clone())
    }

    /// Probe the identity API for a session and the table API for a
    /// readable `users` table.
    pub async fn check_connection(&self) -> ConnectionReport {
        let mut report = ConnectionReport {
            auth_reachable: false,
            database_reachable: false,
            has_session: false,
            error: None,
        };

        match self.auth.get_session().await {
            Ok(session) => {
                report.auth_reachable = true;
                report.has_session = session.is_some();
            }
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "identity API check failed");
                report.error = Some(err.to_string());
                return report;
            }
        }

        match self.profiles.ping().await {
            Ok(()) => report.database_reachable = true,
            Err(err) => {
                warn!(error = %err, code = err.error_code(), "table API check failed");
                report.error = Some(err.to_string());
            }
        }
        report
    }
}
