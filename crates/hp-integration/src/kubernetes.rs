//! Kubernetes integration: the coordination server runs in the same pod
//!
//! Requires a mounted service account and, unless the strict check is
//! disabled, a pod with `spec.shareProcessNamespace: true` so the console
//! can see (and signal) the coordination server's process.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use hp_config::{vars, Environment};
use serde::Deserialize;

use crate::adapter::{Integration, IntegrationError, Result};
use crate::proc::{record_pid, signal_recorded, ProcScanner};

/// Where Kubernetes mounts the pod's service account.
pub const SERVICE_ACCOUNT_ROOT: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

const CA_FILE: &str = "ca.crt";
const TOKEN_FILE: &str = "token";
const NAMESPACE_FILE: &str = "namespace";

const API_TIMEOUT: Duration = Duration::from_secs(10);

/// The subset of a Pod object the strict check needs.
#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    spec: Option<PodSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodSpec {
    #[serde(default)]
    share_process_namespace: Option<bool>,
}

/// Service-account material read from disk.
#[derive(Debug)]
struct ServiceAccount {
    namespace: String,
    token: String,
    ca_pem: Vec<u8>,
}

#[derive(Debug)]
pub struct KubernetesIntegration {
    service_account_dir: PathBuf,
    scanner: ProcScanner,
    /// Overrides `https://$KUBERNETES_SERVICE_HOST:$KUBERNETES_SERVICE_PORT`.
    api_server: Option<String>,
    pid: Mutex<Option<i32>>,
}

impl Default for KubernetesIntegration {
    fn default() -> Self {
        Self::new()
    }
}

impl KubernetesIntegration {
    pub fn new() -> Self {
        Self {
            service_account_dir: PathBuf::from(SERVICE_ACCOUNT_ROOT),
            scanner: ProcScanner::default(),
            api_server: None,
            pid: Mutex::new(None),
        }
    }

    pub fn with_service_account_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.service_account_dir = dir.into();
        self
    }

    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scanner = ProcScanner::new(root);
        self
    }

    pub fn with_api_server(mut self, url: impl Into<String>) -> Self {
        self.api_server = Some(url.into());
        self
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid.lock().map(|g| *g).unwrap_or_else(|p| *p.into_inner())
    }

    /// Check that the service-account directory holds the expected files.
    async fn check_service_account(&self) -> bool {
        let dir = &self.service_account_dir;
        tracing::debug!("Checking Kubernetes service account at {}", dir.display());

        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to access {}: {}", dir.display(), e);
                return false;
            }
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => names.push(entry.file_name()),
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to list {}: {}", dir.display(), e);
                    return false;
                }
            }
        }

        if names.is_empty() {
            tracing::error!("Kubernetes service account not found");
            return false;
        }

        let expected = [CA_FILE, TOKEN_FILE, NAMESPACE_FILE];
        tracing::debug!("Looking for {}", expected.join(", "));
        if !expected.iter().all(|file| names.iter().any(|n| n == *file)) {
            tracing::error!("Malformed Kubernetes service account");
            return false;
        }
        true
    }

    async fn read_service_account(&self) -> Result<ServiceAccount> {
        let read = |name: &'static str| {
            let path = self.service_account_dir.join(name);
            async move {
                tokio::fs::read(&path)
                    .await
                    .map_err(|source| IntegrationError::Io { path, source })
            }
        };

        let namespace = String::from_utf8_lossy(&read(NAMESPACE_FILE).await?)
            .trim()
            .to_string();
        let token = String::from_utf8_lossy(&read(TOKEN_FILE).await?)
            .trim()
            .to_string();
        let ca_pem = read(CA_FILE).await?;

        Ok(ServiceAccount {
            namespace,
            token,
            ca_pem,
        })
    }

    fn api_base(&self, env: &Environment) -> Result<String> {
        if let Some(url) = &self.api_server {
            return Ok(url.trim_end_matches('/').to_string());
        }

        let host = env
            .get_non_empty(vars::KUBERNETES_SERVICE_HOST)
            .ok_or_else(|| IntegrationError::Kubernetes("KUBERNETES_SERVICE_HOST not set".into()))?;
        let port = env.get_non_empty(vars::KUBERNETES_SERVICE_PORT).unwrap_or("443");
        if host.contains(':') {
            Ok(format!("https://[{host}]:{port}"))
        } else {
            Ok(format!("https://{host}:{port}"))
        }
    }

    /// Ask the API server whether our pod shares its process namespace.
    async fn check_pod(
        &self,
        env: &Environment,
        account: &ServiceAccount,
        pod: &str,
    ) -> Result<()> {
        let client = api_client(&account.ca_pem)?;
        let base = self.api_base(env)?;
        let url = format!("{base}/api/v1/namespaces/{}/pods/{pod}", account.namespace);
        tracing::info!("Checking pod {} in namespace {} ({})", pod, account.namespace, base);

        let body = fetch_pod(&client, &url, &account.token).await?;
        tracing::debug!("Got pod info: {:?}", body.spec);
        verify_shared_namespace(&body)
    }
}

/// HTTP client that trusts the service account's CA.
fn api_client(ca_pem: &[u8]) -> Result<reqwest::Client> {
    let certificate = reqwest::Certificate::from_pem(ca_pem)
        .map_err(|e| IntegrationError::Kubernetes(format!("invalid service account CA: {e}")))?;
    reqwest::Client::builder()
        .add_root_certificate(certificate)
        .timeout(API_TIMEOUT)
        .build()
        .map_err(|e| IntegrationError::Kubernetes(e.to_string()))
}

async fn fetch_pod(client: &reqwest::Client, url: &str, token: &str) -> Result<Pod> {
    let response = client
        .get(url)
        .bearer_auth(token)
        .send()
        .await
        .map_err(|e| IntegrationError::Kubernetes(e.to_string()))?;

    if !response.status().is_success() {
        return Err(IntegrationError::Kubernetes(format!(
            "failed to read pod info: http {}",
            response.status().as_u16()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| IntegrationError::Kubernetes(e.to_string()))
}

fn verify_shared_namespace(pod: &Pod) -> Result<()> {
    match pod.spec.as_ref().and_then(|s| s.share_process_namespace) {
        Some(true) => Ok(()),
        Some(false) => Err(IntegrationError::Kubernetes(
            "Pod has set but disabled spec.shareProcessNamespace".into(),
        )),
        None => Err(IntegrationError::Kubernetes(
            "Pod does not have spec.shareProcessNamespace set".into(),
        )),
    }
}

#[async_trait]
impl Integration for KubernetesIntegration {
    fn name(&self) -> &str {
        "Kubernetes (k8s)"
    }

    async fn is_available(&self, env: &Environment) -> bool {
        if !cfg!(target_os = "linux") {
            tracing::error!("Kubernetes is only available on Linux");
            return false;
        }

        if !self.check_service_account().await {
            return false;
        }

        let account = match self.read_service_account().await {
            Ok(account) => account,
            Err(e) => {
                tracing::error!("{}", e);
                return false;
            }
        };

        if env.flag(vars::HEADSCALE_INTEGRATION_UNSTRICT) {
            tracing::warn!("Skipping strict Pod status check");
        } else {
            let pod = match env.get(vars::POD_NAME) {
                Some(pod) if !pod.trim().is_empty() => pod.trim(),
                Some(_) => {
                    tracing::error!("Pod name is empty");
                    return false;
                }
                None => {
                    tracing::error!("Missing POD_NAME variable");
                    return false;
                }
            };

            if let Err(e) = self.check_pod(env, &account, pod).await {
                tracing::error!("{}", e);
                return false;
            }
            tracing::info!("Pod {} enabled shared processes", pod);
        }

        tracing::debug!("Looking for namespaced process in {}", self.scanner.root().display());
        match self.scanner.find_unique_pid().await {
            Some(pid) => {
                record_pid(&self.pid, pid);
                tracing::info!("Found Headscale process with PID: {}", pid);
                true
            }
            None => false,
        }
    }

    fn on_config_change(&self) -> Result<()> {
        signal_recorded(self.name(), &self.pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proc::tests::fake_proc;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn fake_service_account(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(CA_FILE), "not a real certificate").unwrap();
        fs::write(dir.join(TOKEN_FILE), "token\n").unwrap();
        fs::write(dir.join(NAMESPACE_FILE), "headscale\n").unwrap();
    }

    fn unstrict() -> Environment {
        Environment::from_pairs([(vars::HEADSCALE_INTEGRATION_UNSTRICT, "true")])
    }

    #[tokio::test]
    async fn missing_service_account_is_unavailable() {
        let root = tempdir().unwrap();
        let integration = KubernetesIntegration::new()
            .with_service_account_dir(root.path().join("sa"))
            .with_proc_root(root.path().join("proc"));
        assert!(!integration.is_available(&unstrict()).await);
    }

    #[tokio::test]
    async fn malformed_service_account_is_unavailable() {
        let root = tempdir().unwrap();
        let sa = root.path().join("sa");
        fs::create_dir_all(&sa).unwrap();
        fs::write(sa.join(TOKEN_FILE), "token").unwrap();

        let integration = KubernetesIntegration::new()
            .with_service_account_dir(&sa)
            .with_proc_root(root.path().join("proc"));
        assert!(!integration.is_available(&unstrict()).await);
    }

    #[tokio::test]
    async fn strict_mode_requires_pod_name() {
        let root = tempdir().unwrap();
        let sa = root.path().join("sa");
        fake_service_account(&sa);
        let integration = KubernetesIntegration::new()
            .with_service_account_dir(&sa)
            .with_proc_root(root.path().join("proc"));

        assert!(!integration.is_available(&Environment::default()).await);

        let blank = Environment::from_pairs([(vars::POD_NAME, "   ")]);
        assert!(!integration.is_available(&blank).await);
    }

    #[tokio::test]
    async fn strict_mode_rejects_invalid_ca() {
        let root = tempdir().unwrap();
        let sa = root.path().join("sa");
        fake_service_account(&sa);
        let integration = KubernetesIntegration::new()
            .with_service_account_dir(&sa)
            .with_proc_root(root.path().join("proc"))
            .with_api_server("https://127.0.0.1:1");

        let env = Environment::from_pairs([(vars::POD_NAME, "headplane-0")]);
        assert!(!integration.is_available(&env).await);
        assert!(api_client(b"not a real certificate").is_err());
    }

    /// Fake API server: `headplane-0` shares its namespace, `lonely-0`
    /// does not, and any other token is rejected.
    async fn spawn_api_server() -> String {
        use axum::extract::Path as UrlPath;
        use axum::http::{HeaderMap, StatusCode};
        use axum::response::IntoResponse;
        use axum::routing::get;
        use axum::{Json, Router};
        use serde_json::json;

        let app = Router::new().route(
            "/api/v1/namespaces/{ns}/pods/{pod}",
            get(|UrlPath(path): UrlPath<(String, String)>, headers: HeaderMap| async move {
                let (ns, pod) = path;
                let token = headers.get("authorization").and_then(|v| v.to_str().ok());
                if token != Some("Bearer token") || ns != "headscale" {
                    return StatusCode::FORBIDDEN.into_response();
                }
                let shared = pod == "headplane-0";
                Json(json!({"spec": {"shareProcessNamespace": shared}})).into_response()
            }),
        );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    #[tokio::test]
    async fn pod_lookup_reads_share_process_namespace() {
        let base = spawn_api_server().await;
        let client = reqwest::Client::new();
        let url = |ns: &str, pod: &str| format!("{base}/api/v1/namespaces/{ns}/pods/{pod}");

        let pod = fetch_pod(&client, &url("headscale", "headplane-0"), "token")
            .await
            .unwrap();
        assert!(verify_shared_namespace(&pod).is_ok());

        let pod = fetch_pod(&client, &url("headscale", "lonely-0"), "token")
            .await
            .unwrap();
        assert!(verify_shared_namespace(&pod).is_err());

        let err = fetch_pod(&client, &url("headscale", "headplane-0"), "wrong")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));

        let err = fetch_pod(&client, "http://127.0.0.1:1/pods/x", "token")
            .await
            .unwrap_err();
        assert!(matches!(err, IntegrationError::Kubernetes(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn unstrict_mode_finds_process() {
        let root = tempdir().unwrap();
        let sa = root.path().join("sa");
        fake_service_account(&sa);
        let proc_root = root.path().join("proc");
        fake_proc(&proc_root, &[("3999100", "headscale\0serve")]);

        let integration = KubernetesIntegration::new()
            .with_service_account_dir(&sa)
            .with_proc_root(&proc_root);
        assert!(integration.is_available(&unstrict()).await);
        assert_eq!(integration.pid(), Some(3999100));
    }

    #[test]
    fn api_base_from_env() {
        let integration = KubernetesIntegration::new();
        let env = Environment::from_pairs([
            (vars::KUBERNETES_SERVICE_HOST, "10.0.0.1"),
            (vars::KUBERNETES_SERVICE_PORT, "6443"),
        ]);
        assert_eq!(integration.api_base(&env).unwrap(), "https://10.0.0.1:6443");

        let env = Environment::from_pairs([(vars::KUBERNETES_SERVICE_HOST, "fd00::1")]);
        assert_eq!(integration.api_base(&env).unwrap(), "https://[fd00::1]:443");

        assert!(integration.api_base(&Environment::default()).is_err());
    }

    #[test]
    fn shared_namespace_must_be_enabled() {
        let pod: Pod = serde_json::from_str(r#"{"spec":{"shareProcessNamespace":true}}"#).unwrap();
        assert!(verify_shared_namespace(&pod).is_ok());

        let pod: Pod = serde_json::from_str(r#"{"spec":{"shareProcessNamespace":false}}"#).unwrap();
        assert!(verify_shared_namespace(&pod).is_err());

        let pod: Pod = serde_json::from_str(r#"{"spec":{}}"#).unwrap();
        assert!(verify_shared_namespace(&pod).is_err());
    }
}
