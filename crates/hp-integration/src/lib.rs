//! Platform integrations for the Headplane console
//!
//! An integration locates the coordination server's process so the console
//! can restart it after editing its config file. The core abstraction is the
//! `Integration` trait, with built-in implementations for Kubernetes (shared
//! process namespace) and plain Linux `/proc`. Exactly one integration is
//! active per process: the first in `default_integrations()` whose probe
//! succeeds.

pub mod adapter;
pub mod kubernetes;
pub mod proc;
pub mod registry;

pub use adapter::{Integration, IntegrationError};
pub use kubernetes::KubernetesIntegration;
pub use proc::{ProcIntegration, ProcScanner};
pub use registry::{default_integrations, load_integration};
