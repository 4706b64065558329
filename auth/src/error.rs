//! Error types for provider calls, configuration, and store actions.
//!
//! ERROR HANDLING
//! ==============
//! Two severities reach the UI. `ProviderError::Transport` means the backend
//! could not be reached at all and feeds the store's `connection_error`.
//! Everything else is a rejection of one specific call and is returned to
//! the caller for inline display only.

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;

/// PostgREST code for "zero rows where exactly one was requested".
pub const POSTGREST_NOT_FOUND: &str = "PGRST116";

/// Grep-able error codes for log lines and CLI output.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

// =============================================================================
// PROVIDER
// =============================================================================

/// Errors produced by identity-provider and profile-store calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The request never produced a response (DNS, TLS, refused, timeout).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("{message}")]
    Api { status: u16, code: Option<String>, message: String },

    /// The response body did not have the expected shape.
    #[error("response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// Reading or writing the persisted session failed.
    #[error("session storage failed: {0}")]
    Storage(String),

    /// The call needs a session and there is none.
    #[error("not signed in")]
    NotSignedIn,

    /// A code exchange was attempted without a preceding OAuth redirect.
    #[error("no OAuth sign-in is pending")]
    NoPendingOAuth,
}

impl ProviderError {
    /// True when the backend reported that the requested row does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Api { code: Some(code), .. } => code == POSTGREST_NOT_FOUND,
            _ => false,
        }
    }

    /// True when the backend could not be reached at all.
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl ErrorCode for ProviderError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Api { .. } => "E_PROVIDER_REJECTED",
            Self::Parse(_) => "E_PROVIDER_PARSE",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Storage(_) => "E_SESSION_STORAGE",
            Self::NotSignedIn => "E_NOT_SIGNED_IN",
            Self::NoPendingOAuth => "E_NO_PENDING_OAUTH",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Api { status: 429 | 500..=599, .. })
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env var {var}")]
    Missing { var: &'static str },

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "E_CONFIG_MISSING",
            Self::Invalid { .. } => "E_CONFIG_INVALID",
        }
    }
}

// =============================================================================
// ACTIONS
// =============================================================================

/// Errors returned from the store's sign-in, sign-up, OAuth, and sign-out actions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// Rejected locally before the provider was called.
    #[error("{0}")]
    Invalid(&'static str),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ActionError {
    /// The provider error behind this failure, if the provider was called.
    #[must_use]
    pub fn provider(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl ErrorCode for ActionError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Invalid(_) => "E_INVALID_INPUT",
            Self::Provider(err) => err.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        self.provider().is_some_and(ErrorCode::retryable)
    }
}
