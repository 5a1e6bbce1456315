//! # hp-daemon
//!
//! HTTP server for the Headplane console. The binary bootstraps the
//! process-wide [`hp_context::Context`] once, then serves the router from
//! [`routes::build_router`] with the context injected as axum state.

pub mod api;
pub mod auth;
pub mod error;
pub mod login;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
