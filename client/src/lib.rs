//! # client
//!
//! Leptos front end for the Village Fresh storefront's authentication
//! surface.
//!
//! The crate never talks to the identity provider itself. It receives a
//! running `SessionStore`, mirrors its state into a signal, and renders
//! route guards and auth screens on top of it.

pub mod app;
pub mod components;
pub mod pages;
pub mod state;
