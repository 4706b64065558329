//! # auth
//!
//! Session management for the Village Fresh storefront.
//!
//! ARCHITECTURE
//! ============
//! The identity provider and the profile table live behind a hosted backend.
//! This crate owns everything the front end needs on top of it:
//!
//! - `store`: the Session Store / Auth Gateway. Bootstraps once, follows the
//!   provider's event stream, and exposes a reactive `AuthViewState`.
//! - `guard`: pure routing decisions for private and admin-only views.
//! - `provider`: the async trait seams the store talks through.
//! - `supabase`: the HTTP implementation of those seams (native targets).
//! - `storage`: persisted sessions across restarts.
//!
//! UI layers (the `client` crate, the CLI) read the store and call its
//! actions; they never talk to the provider directly.

pub mod config;
pub mod error;
pub mod guard;
pub mod provider;
pub mod storage;
pub mod store;
#[cfg(not(target_arch = "wasm32"))]
pub mod supabase;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::AuthConfig;
pub use error::{ActionError, ConfigError, ErrorCode, ProviderError};
pub use guard::{GuardOutcome, admin_route, private_route};
pub use provider::{IdentityProvider, ProfileStore, Subscription};
pub use store::{AuthViewState, SessionStore, StoreOptions};
pub use types::{AuthEvent, AuthResponse, Identity, NewProfile, OAuthRedirect, Profile, Session};
