//! # headplane
//!
//! Web console for a Headscale coordination server.
//!
//! Reads its settings from the environment (optionally a `.env` file), the
//! Headscale config file and `HEADPLANE_*` overlay variables, then serves
//! the console over HTTP.
//!
//! ## Usage
//!
//! ```text
//! COOKIE_SECRET=... HEADSCALE_URL=http://headscale:8080 headplane --listen 0.0.0.0:3000
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hp_config::{vars, Environment};
use hp_context::{load_context, ContextBuilder, DiscoveryValidator, DEFAULT_ENV_FILE};
use hp_daemon::{build_router, AppState};
use hp_headscale::HeadscaleClient;

const RUST_LOG: &str = "RUST_LOG";

const LOG_TARGETS: [&str; 6] = [
    "headplane",
    "hp_daemon",
    "hp_context",
    "hp_config",
    "hp_integration",
    "hp_headscale",
];

/// Headplane web console.
#[derive(Parser)]
#[command(name = "headplane", about = "Web console for Headscale")]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "0.0.0.0:3000")]
    listen: SocketAddr,

    /// File read when LOAD_ENV_FILE=true.
    #[arg(long, default_value = DEFAULT_ENV_FILE)]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = Environment::from_process();

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(
            env.get(RUST_LOG),
            debug_enabled(&env, &cli.env_file),
        )?)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting Headplane {}", env!("CARGO_PKG_VERSION"));

    let context = load_context(ContextBuilder::new(env).env_file(cli.env_file))
        .await
        .map_err(|e| anyhow::anyhow!("{}", e))
        .inspect_err(|e| tracing::error!("Startup failed: {}", e))?;

    let headscale = HeadscaleClient::new(&context.headscale_url)?;
    let state = AppState::new(context, headscale, DiscoveryValidator::new()?);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Headplane shutting down");
    Ok(())
}

/// `RUST_LOG` when set, else our crates at `info` (`debug` with DEBUG=true).
fn log_filter(rust_log: Option<&str>, debug: bool) -> Result<EnvFilter> {
    if let Some(directives) = rust_log.filter(|d| !d.is_empty()) {
        return Ok(EnvFilter::try_new(directives)?);
    }
    let level = if debug { "debug" } else { "info" };
    let mut filter = EnvFilter::new("warn");
    for target in LOG_TARGETS {
        filter = filter.add_directive(format!("{target}={level}").parse()?);
    }
    Ok(filter)
}

/// DEBUG from the process environment, or from the `.env` file the context
/// is about to load. Errors reading the file are reported by the bootstrap.
fn debug_enabled(env: &Environment, env_file: &Path) -> bool {
    if env.flag(vars::DEBUG) || !env.flag(vars::LOAD_ENV_FILE) {
        return env.flag(vars::DEBUG);
    }
    let mut with_file = env.clone();
    with_file.load_env_file(env_file).is_ok() && with_file.flag(vars::DEBUG)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
