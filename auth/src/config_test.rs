use std::collections::HashMap;

use super::*;

fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

fn base() -> Vec<(&'static str, &'static str)> {
    vec![("SUPABASE_URL", "https://demo.supabase.co/"), ("SUPABASE_ANON_KEY", "anon")]
}

// =============================================================================
// Required vars
// =============================================================================

#[test]
fn missing_url_is_an_error() {
    let err = AuthConfig::from_vars(vars(&[("SUPABASE_ANON_KEY", "anon")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing { var: "SUPABASE_URL" });
}

#[test]
fn blank_anon_key_is_missing() {
    let err = AuthConfig::from_vars(vars(&[("SUPABASE_URL", "https://x"), ("SUPABASE_ANON_KEY", " ")])).unwrap_err();
    assert_eq!(err, ConfigError::Missing { var: "SUPABASE_ANON_KEY" });
}

// =============================================================================
// Defaults
// =============================================================================

#[test]
fn defaults_apply_when_optional_vars_absent() {
    let config = AuthConfig::from_vars(vars(&base())).unwrap();
    assert_eq!(config.url, "https://demo.supabase.co");
    assert_eq!(config.redirect_url, DEFAULT_REDIRECT_URL);
    assert!(config.session_file.is_none());
    assert!(config.auto_refresh);
    assert_eq!(config.refresh_margin_secs, DEFAULT_REFRESH_MARGIN_SECS);
    assert_eq!(config.timeouts, HttpTimeouts::default());
    assert_eq!(config.client_info, "village-fresh-app");
}

#[test]
fn unparseable_numbers_fall_back_to_defaults() {
    let mut pairs = base();
    pairs.push(("AUTH_REQUEST_TIMEOUT_SECS", "soon"));
    pairs.push(("AUTH_REFRESH_MARGIN_SECS", "-5"));
    let config = AuthConfig::from_vars(vars(&pairs)).unwrap();
    assert_eq!(config.timeouts.request_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    assert_eq!(config.refresh_margin_secs, DEFAULT_REFRESH_MARGIN_SECS);
}

// =============================================================================
// Overrides
// =============================================================================

#[test]
fn optional_vars_override_defaults() {
    let mut pairs = base();
    pairs.extend([
        ("AUTH_REDIRECT_URL", "https://shop.example/home"),
        ("AUTH_SESSION_FILE", "/tmp/session.json"),
        ("AUTH_AUTO_REFRESH", "off"),
        ("AUTH_REFRESH_MARGIN_SECS", "120"),
        ("AUTH_CONNECT_TIMEOUT_SECS", "3"),
        ("AUTH_CLIENT_INFO", "fresh-cli"),
    ]);
    let config = AuthConfig::from_vars(vars(&pairs)).unwrap();
    assert_eq!(config.redirect_url, "https://shop.example/home");
    assert_eq!(config.session_file, Some(PathBuf::from("/tmp/session.json")));
    assert!(!config.auto_refresh);
    assert_eq!(config.refresh_margin_secs, 120);
    assert_eq!(config.timeouts.connect(), Duration::from_secs(3));
    assert_eq!(config.client_info, "fresh-cli");
}

#[test]
fn invalid_bool_is_an_error() {
    let mut pairs = base();
    pairs.push(("AUTH_AUTO_REFRESH", "sometimes"));
    let err = AuthConfig::from_vars(vars(&pairs)).unwrap_err();
    assert_eq!(err, ConfigError::Invalid { var: "AUTH_AUTO_REFRESH", value: "sometimes".into() });
}

// =============================================================================
// Endpoints
// =============================================================================

#[test]
fn endpoints_join_without_double_slash() {
    let config = AuthConfig::new("https://demo.supabase.co///", "anon");
    assert_eq!(config.auth_endpoint("signup"), "https://demo.supabase.co/auth/v1/signup");
    assert_eq!(config.rest_endpoint("users"), "https://demo.supabase.co/rest/v1/users");
}
