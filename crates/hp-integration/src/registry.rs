//! Ordered integration registry and first-available selection

use std::sync::Arc;

use hp_config::Environment;

use crate::adapter::Integration;
use crate::kubernetes::KubernetesIntegration;
use crate::proc::ProcIntegration;

/// The built-in integrations in priority order.
///
/// Kubernetes comes first: inside a pod with a shared process namespace the
/// `/proc` probe would also succeed, and the Kubernetes adapter is the one
/// that verified the pod is set up for signalling.
pub fn default_integrations() -> Vec<Arc<dyn Integration>> {
    vec![
        Arc::new(KubernetesIntegration::new()),
        Arc::new(ProcIntegration::new()),
    ]
}

/// Probe `candidates` in order and return the first available one.
///
/// Later candidates are not probed once one succeeds. No available
/// integration is not an error.
pub async fn load_integration(
    candidates: &[Arc<dyn Integration>],
    env: &Environment,
) -> Option<Arc<dyn Integration>> {
    for candidate in candidates {
        tracing::debug!("Probing integration {}", candidate.name());
        if candidate.is_available(env).await {
            tracing::info!("Using integration {}", candidate.name());
            return Some(Arc::clone(candidate));
        }
        tracing::debug!("Integration {} is not available", candidate.name());
    }
    None
}
