//! `fresh-cli`: drive the Village Fresh sign-in flows from a terminal.
//!
//! Every command builds the same `SessionStore` the storefront uses, waits
//! for it to settle, runs one action, and prints the resulting
//! `AuthViewState` as JSON on stdout. Logs go to stderr.


use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use auth::supabase::SupabaseBackend;
use auth::{
    ActionError, AuthConfig, AuthViewState, ConfigError, ErrorCode, GuardOutcome, ProviderError, SessionStore,
    admin_route, private_route,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;

const SETTLE_TIMEOUT_SECS: u64 = 15;
/// How long to wait for the profile row after a sign-in before printing.
const PROFILE_GRACE_MILLIS: u64 = 1500;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error("backend check failed: {0}")]
    Unhealthy(String),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("access denied; redirect to {0}")]
    Denied(&'static str),
    #[error("no authorization code found in input")]
    MissingCode,
    #[error("failed to read input: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Config(err) => err.error_code(),
            Self::Provider(err) => err.error_code(),
            Self::Action(err) => err.error_code(),
            Self::Unhealthy(_) => "E_UNHEALTHY",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::Denied(_) => "E_ACCESS_DENIED",
            Self::MissingCode => "E_MISSING_CODE",
            Self::Io(_) => "E_IO",
            Self::Json(_) => "E_JSON",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fresh-cli", about = "Village Fresh authentication CLI")]
struct Cli {
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: String,

    #[arg(long, env = "SUPABASE_ANON_KEY", hide_env_values = true)]
    anon_key: String,

    #[arg(long, env = "AUTH_SESSION_FILE", default_value = ".village-fresh/session.json")]
    session_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the identity and table APIs answer.
    Ping,
    /// Print the current authentication state.
    Session,
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FRESH_PASSWORD", hide_env_values = true)]
        password: String,
    },
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long, env = "FRESH_PASSWORD", hide_env_values = true)]
        password: String,
        #[arg(long)]
        name: String,
    },
    /// Sign in through an external provider. Prints the authorization URL,
    /// then reads the callback URL (or bare code) from stdin unless `--code`
    /// is given.
    Oauth {
        #[arg(long, default_value = "google")]
        provider: String,
        #[arg(long)]
        code: Option<String>,
    },
    SignOut,
    /// Evaluate a route guard against the current state.
    Guard {
        #[arg(value_enum)]
        route: GuardRoute,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum GuardRoute {
    Private,
    Admin,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct GuardReport {
    route: &'static str,
    outcome: &'static str,
    redirect: Option<&'static str>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(io::stderr).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error [{}]: {err}", err.error_code());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    let backend = SupabaseBackend::connect(&config)?;

    if matches!(cli.command, Command::Ping) {
        return run_ping(&backend).await;
    }

    let store = backend.start_store();
    let result = run_with_store(&store, cli.command).await;
    store.shutdown();
    result
}

async fn run_with_store(store: &SessionStore, command: Command) -> Result<(), CliError> {
    let state = settle(store).await?;
    match command {
        Command::Ping => Ok(()),
        Command::Session => print_json(&state),
        Command::SignIn { email, password } => {
            store.sign_in_with_email(&email, &password).await?;
            print_json(&wait_for_sign_in(store).await?)
        }
        Command::SignUp { email, password, name } => {
            let response = store.sign_up_with_email(&email, &password, &name).await?;
            if response.session.is_some() {
                print_json(&wait_for_sign_in(store).await?)
            } else {
                info!(email = %email, "account created; confirm the email address to sign in");
                print_json(&response)
            }
        }
        Command::Oauth { provider, code } => {
            let redirect = store.sign_in_with_oauth(&provider).await?;
            eprintln!("open this URL to continue:\n{}", redirect.url);
            let code = match code {
                Some(code) => code,
                None => {
                    eprintln!("paste the callback URL or code:");
                    read_code(io::stdin().lock())?
                }
            };
            store.complete_oauth(&code).await?;
            print_json(&wait_for_sign_in(store).await?)
        }
        Command::SignOut => {
            store.sign_out().await?;
            print_json(&store.snapshot())
        }
        Command::Guard { route } => {
            let report = guard_report(route, &state);
            print_json(&report)?;
            match report.redirect {
                Some(path) => Err(CliError::Denied(path)),
                None => Ok(()),
            }
        }
    }
}

async fn run_ping(backend: &SupabaseBackend) -> Result<(), CliError> {
    let report = backend.check_connection().await;
    print_json(&report)?;
    if report.is_healthy() {
        Ok(())
    } else {
        Err(CliError::Unhealthy(report.error.unwrap_or_else(|| "unknown error".to_owned())))
    }
}

/// CLI flags override their environment counterparts; everything else comes
/// from the environment.
fn load_config(cli: &Cli) -> Result<AuthConfig, ConfigError> {
    let session_file = cli.session_file.to_string_lossy().into_owned();
    AuthConfig::from_vars(|key| match key {
        "SUPABASE_URL" => Some(cli.supabase_url.clone()),
        "SUPABASE_ANON_KEY" => Some(cli.anon_key.clone()),
        "AUTH_SESSION_FILE" => Some(session_file.clone()),
        _ => std::env::var(key).ok(),
    })
}

async fn settle(store: &SessionStore) -> Result<AuthViewState, CliError> {
    tokio::time::timeout(Duration::from_secs(SETTLE_TIMEOUT_SECS), store.settled())
        .await
        .map_err(|_| CliError::Timeout("initial session probe"))
}

/// Wait for the sign-in event to land, then briefly for the profile row,
/// which may legitimately not exist.
async fn wait_for_sign_in(store: &SessionStore) -> Result<AuthViewState, CliError> {
    let mut rx = store.subscribe();
    let signed_in = tokio::time::timeout(
        Duration::from_secs(SETTLE_TIMEOUT_SECS),
        rx.wait_for(|state| state.is_authenticated),
    )
    .await
    .is_ok_and(|result| result.is_ok());
    if !signed_in {
        return Err(CliError::Timeout("sign-in event"));
    }

    let _ = tokio::time::timeout(
        Duration::from_millis(PROFILE_GRACE_MILLIS),
        rx.wait_for(|state| state.profile.is_some()),
    )
    .await;
    Ok(store.snapshot())
}

fn guard_report(route: GuardRoute, state: &AuthViewState) -> GuardReport {
    let (name, outcome) = match route {
        GuardRoute::Private => ("private", private_route(state)),
        GuardRoute::Admin => ("admin", admin_route(state)),
    };
    match outcome {
        GuardOutcome::Waiting => GuardReport { route: name, outcome: "waiting", redirect: None },
        GuardOutcome::Allow => GuardReport { route: name, outcome: "allow", redirect: None },
        GuardOutcome::Redirect(path) => GuardReport { route: name, outcome: "redirect", redirect: Some(path) },
    }
}

fn read_code(mut input: impl BufRead) -> Result<String, CliError> {
    let mut line = String::new();
    input.read_line(&mut line)?;
    extract_code(&line).ok_or(CliError::MissingCode)
}

/// Accept either the full callback URL (`...?code=abc`) or the bare code.
fn extract_code(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    match reqwest::Url::parse(trimmed) {
        Ok(url) => url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .filter(|code| !code.is_empty()),
        Err(_) => Some(trimmed.to_owned()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
