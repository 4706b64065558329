//! Reusable UI component modules.
//!
//! SYSTEM CONTEXT
//! ==============
//! Components read auth state from the context installed by
//! `state::auth::provide_auth` and never call the provider directly.

pub mod connection_banner;
pub mod route_guard;
