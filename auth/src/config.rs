//! Backend and session configuration parsed from environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_REDIRECT_URL: &str = "http://localhost:5173/home";
pub const DEFAULT_CLIENT_INFO: &str = "village-fresh-app";
pub const DEFAULT_REFRESH_MARGIN_SECS: u64 = 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Backend base URL without a trailing slash.
    pub url: String,
    /// Public anon key sent as `apikey` on every request.
    pub anon_key: String,
    /// Where OAuth providers send the browser back to.
    pub redirect_url: String,
    /// Persisted session file. `None` keeps sessions in memory only.
    pub session_file: Option<PathBuf>,
    pub auto_refresh: bool,
    pub refresh_margin_secs: u64,
    pub timeouts: HttpTimeouts,
    /// Value of the `X-Client-Info` header.
    pub client_info: String,
}

impl AuthConfig {
    /// Config with defaults for everything except the backend coordinates.
    #[must_use]
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: normalize_url(&url.into()),
            anon_key: anon_key.into(),
            redirect_url: DEFAULT_REDIRECT_URL.to_owned(),
            session_file: None,
            auto_refresh: true,
            refresh_margin_secs: DEFAULT_REFRESH_MARGIN_SECS,
            timeouts: HttpTimeouts::default(),
            client_info: DEFAULT_CLIENT_INFO.to_owned(),
        }
    }

    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `SUPABASE_URL`
    /// - `SUPABASE_ANON_KEY`
    ///
    /// Optional:
    /// - `AUTH_REDIRECT_URL`: OAuth completion target
    /// - `AUTH_SESSION_FILE`: enables persisted sessions
    /// - `AUTH_AUTO_REFRESH`: `true` (default) or `false`
    /// - `AUTH_REFRESH_MARGIN_SECS`: default 60
    /// - `AUTH_REQUEST_TIMEOUT_SECS`: default 30
    /// - `AUTH_CONNECT_TIMEOUT_SECS`: default 10
    /// - `AUTH_CLIENT_INFO`: default `village-fresh-app`
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a boolean flag
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`AuthConfig::from_env`] with an injectable lookup.
    ///
    /// # Errors
    ///
    /// See [`AuthConfig::from_env`].
    pub fn from_vars<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = required(&lookup, "SUPABASE_URL")?;
        let anon_key = required(&lookup, "SUPABASE_ANON_KEY")?;
        let mut config = Self::new(url, anon_key);

        if let Some(redirect) = lookup("AUTH_REDIRECT_URL").filter(|v| !v.trim().is_empty()) {
            config.redirect_url = redirect;
        }
        config.session_file = lookup("AUTH_SESSION_FILE")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        if let Some(raw) = lookup("AUTH_AUTO_REFRESH") {
            config.auto_refresh = parse_bool("AUTH_AUTO_REFRESH", &raw)?;
        }
        config.refresh_margin_secs = parse_or(&lookup, "AUTH_REFRESH_MARGIN_SECS", DEFAULT_REFRESH_MARGIN_SECS);
        config.timeouts = HttpTimeouts {
            request_secs: parse_or(&lookup, "AUTH_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parse_or(&lookup, "AUTH_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS),
        };
        if let Some(info) = lookup("AUTH_CLIENT_INFO").filter(|v| !v.trim().is_empty()) {
            config.client_info = info;
        }
        Ok(config)
    }

    /// Endpoint under the identity API, e.g. `auth_endpoint("signup")`.
    #[must_use]
    pub fn auth_endpoint(&self, path: &str) -> String {
        format!("{}/auth/v1/{path}", self.url)
    }

    /// Endpoint under the table API, e.g. `rest_endpoint("users")`.
    #[must_use]
    pub fn rest_endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.url)
    }
}

fn normalize_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_owned()
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|v| !v.trim().is_empty())
        .ok_or(ConfigError::Missing { var })
}

fn parse_or<F>(lookup: &F, var: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_bool(var: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid { var, value: raw.to_owned() }),
    }
}
