//! Wire shapes and pure parsing for the identity and table APIs.
//!
//! Everything here is I/O free so the response handling can be tested with
//! captured payloads.

#[cfg(test)]
#[path = "wire_test.rs"]
mod wire_test;

use serde::Serialize;
use serde_json::Value;

use crate::error::ProviderError;
use crate::types::{AuthResponse, Identity, Profile, Session};

/// PKCE challenge method the identity API expects (lowercase).
pub const CHALLENGE_METHOD: &str = "s256";

// =============================================================================
// REQUEST BODIES
// =============================================================================

#[derive(Serialize)]
pub(crate) struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: SignUpData<'a>,
}

#[derive(Serialize)]
pub(crate) struct SignUpData<'a> {
    pub name: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

#[derive(Serialize)]
pub(crate) struct PkceGrant<'a> {
    pub auth_code: &'a str,
    pub code_verifier: &'a str,
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a token-endpoint response, filling `expires_at` from `now` when the
/// backend only sent `expires_in`.
pub fn parse_session(json: &str, now: i64) -> Result<Session, ProviderError> {
    let session: Session = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(session.with_expiry_from(now))
}

/// Parse a sign-up response.
///
/// With auto-confirm the backend answers with a full session. While email
/// confirmation is pending it answers with the bare user object (or a
/// `{ user, session: null }` envelope on some versions).
pub fn parse_sign_up(json: &str, now: i64) -> Result<AuthResponse, ProviderError> {
    let value: Value = serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))?;

    if value.get("access_token").is_some_and(|t| !t.is_null()) {
        let session: Session = serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;
        return Ok(AuthResponse::from_session(session.with_expiry_from(now)));
    }

    let user_value = match value.get("user") {
        Some(user) if !user.is_null() => user.clone(),
        _ => value,
    };
    let user: Identity = serde_json::from_value(user_value).map_err(|e| ProviderError::Parse(e.to_string()))?;
    Ok(AuthResponse { user: Some(user), session: None })
}

/// Parse a single `users` row.
pub fn parse_profile(json: &str) -> Result<Profile, ProviderError> {
    serde_json::from_str(json).map_err(|e| ProviderError::Parse(e.to_string()))
}

/// Turn a non-success response into `ProviderError::Api`.
///
/// The identity API and the table API use different error bodies:
/// - `{"error": "invalid_grant", "error_description": "..."}`
/// - `{"code": 400, "error_code": "...", "msg": "..."}`
/// - `{"code": "PGRST116", "message": "...", "details": ..., "hint": ...}`
///
/// Unknown or non-JSON bodies fall back to the raw text.
#[must_use]
pub fn parse_api_error(status: u16, body: &str) -> ProviderError {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let text = |key: &str| {
        value
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_owned)
    };

    let message = text("error_description")
        .or_else(|| text("msg"))
        .or_else(|| text("message"))
        .or_else(|| text("error"))
        .or_else(|| Some(body.trim().to_owned()).filter(|b| !b.is_empty()))
        .unwrap_or_else(|| format!("request failed with status {status}"));
    let code = text("error_code").or_else(|| text("code")).or_else(|| text("error"));

    ProviderError::Api { status, code, message }
}

/// Authorization URL for a redirect-based sign-in with a PKCE challenge.
pub fn authorize_url(base_url: &str, provider: &str, redirect_to: &str, challenge: &str) -> Result<String, ProviderError> {
    let endpoint = format!("{base_url}/auth/v1/authorize");
    let url = reqwest::Url::parse_with_params(
        &endpoint,
        &[
            ("provider", provider),
            ("redirect_to", redirect_to),
            ("code_challenge", challenge),
            ("code_challenge_method", CHALLENGE_METHOD),
        ],
    )
    .map_err(|e| ProviderError::Parse(format!("invalid backend url {endpoint}: {e}")))?;
    Ok(url.into())
}

#[must_use]
pub fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}
