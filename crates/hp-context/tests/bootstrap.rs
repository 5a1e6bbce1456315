// bootstrap.rs — End-to-end context bootstrap with real adapters.
//
// Uses the real `/proc` integration against a fake process table and the
// real discovery validator against an in-process identity provider.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use hp_config::{vars, Environment};
use hp_context::{ContextBuilder, DiscoveryValidator, OidcSource};
use hp_integration::{Integration, ProcIntegration};
use serde_json::json;

fn fake_proc(root: &Path, procs: &[(&str, &str)]) {
    for (pid, cmdline) in procs {
        let dir = root.join(pid);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("cmdline"), cmdline).unwrap();
    }
}

async fn spawn_idp() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let doc = json!({
        "issuer": base,
        "authorization_endpoint": format!("{base}/authorize"),
        "token_endpoint": format!("{base}/token"),
        "userinfo_endpoint": format!("{base}/userinfo"),
    });
    let app = Router::new().route(
        "/.well-known/openid-configuration",
        get(move || async move { Json(doc) }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

#[tokio::test]
async fn full_bootstrap_with_proc_integration_and_oidc() {
    let dir = tempfile::tempdir().unwrap();
    let proc_root = dir.path().join("proc");
    fake_proc(
        &proc_root,
        &[
            ("3999101", "/sbin/init"),
            ("3999102", "/usr/bin/headscale\0serve"),
        ],
    );

    let issuer = spawn_idp().await;
    let config_path = dir.path().join("config.yaml");
    fs::write(
        &config_path,
        format!(
            "server_url: https://hs.example.com\n\
             oidc:\n  issuer: {issuer}\n  client_id: headplane\n  client_secret: s3cret\
             \n  only_start_if_oidc_is_available: true\n"
        ),
    )
    .unwrap();

    let env = Environment::from_pairs([
        (vars::CONFIG_FILE, config_path.display().to_string()),
        (vars::COOKIE_SECRET, "cookie".to_string()),
        (vars::API_KEY, "api-key".to_string()),
        (
            vars::USER_STORE_PATH,
            dir.path().join("users.json").display().to_string(),
        ),
    ]);

    let proc = Arc::new(ProcIntegration::with_proc_root(&proc_root));
    let ctx = ContextBuilder::new(env)
        .integrations(vec![proc.clone() as Arc<dyn Integration>])
        .validator(Arc::new(DiscoveryValidator::new().unwrap()))
        .build()
        .await
        .unwrap();

    assert_eq!(ctx.headscale_url, "https://hs.example.com");
    assert_eq!(ctx.integration_name(), "Native Linux (/proc)");
    assert_eq!(proc.pid(), Some(3999102));
    assert!(ctx.config.read && ctx.config.write);
    assert_eq!(ctx.root_api_key, "api-key");

    let oidc = ctx.oidc.as_ref().unwrap();
    assert_eq!(oidc.source, OidcSource::ConfigFile);
    assert_eq!(oidc.issuer, issuer);
    assert_eq!(oidc.root_key, "api-key");
}

#[tokio::test]
async fn unreachable_provider_disables_oidc_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    let env = Environment::from_pairs([
        (vars::HEADSCALE_URL, "http://headscale:8080".to_string()),
        (vars::COOKIE_SECRET, "cookie".to_string()),
        (vars::ROOT_API_KEY, "root".to_string()),
        (vars::OIDC_ISSUER, "http://127.0.0.1:1".to_string()),
        (vars::OIDC_CLIENT_ID, "headplane".to_string()),
        (vars::OIDC_CLIENT_SECRET, "s3cret".to_string()),
        (
            vars::CONFIG_FILE,
            dir.path().join("none.yaml").display().to_string(),
        ),
        (
            vars::USER_STORE_PATH,
            dir.path().join("users.json").display().to_string(),
        ),
    ]);

    let ctx = ContextBuilder::new(env)
        .integrations(Vec::new())
        .build()
        .await
        .unwrap();
    assert!(ctx.oidc.is_none());
}
