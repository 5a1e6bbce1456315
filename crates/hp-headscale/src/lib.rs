//! Typed client for the Headscale coordination server API
//!
//! Wraps the REST endpoints the console uses (users, pre-auth keys, API key
//! checks) behind `HeadscaleClient::session(api_key)`, plus a couple of pure
//! helpers for presenting users in the UI.

pub mod client;
pub mod error;
pub mod types;
pub mod user;

pub use client::{ApiSession, CreatePreAuthKey, HeadscaleClient};
pub use error::HeadscaleError;
pub use types::{ApiKey, PreAuthKey, User};
pub use user::{filter_users_with_valid_ids, user_display_name};
