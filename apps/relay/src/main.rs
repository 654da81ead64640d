use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use relay_core::bootstrap::{BootArgs, bootstrap};
use relay_core::engine::Engine;
use relay_core::upstream_client::FreshWreqClient;

#[derive(Debug, Parser)]
#[command(name = "relay", about = "Failover-first LLM reverse proxy")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0:8000")]
    bind: String,

    /// Path to the configuration file.
    #[arg(long, env = "RELAY_CONFIG", default_value = "json_data/all_configs.json")]
    config: PathBuf,

    /// Directory for the usage store and flow logs.
    #[arg(long, env = "RELAY_DATA_DIR", default_value = "json_data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let state = bootstrap(BootArgs {
        config_path: args.config,
        data_dir: args.data_dir,
    })?;

    #[cfg(unix)]
    spawn_reload_on_sighup(state.clone());

    let engine = Arc::new(Engine::new(state, Arc::new(FreshWreqClient)));
    let app = relay_router::proxy_router(engine);

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    info!(bind = %args.bind, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// `kill -HUP` re-reads the configuration file after a manual edit. Live
/// requests keep the snapshot they started with.
#[cfg(unix)]
fn spawn_reload_on_sighup(state: Arc<relay_core::AppState>) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let Ok(mut hangup) = signal(SignalKind::hangup()) else {
            return;
        };
        while hangup.recv().await.is_some() {
            if let Err(err) = state.reload().await {
                tracing::warn!("config reload failed: {err}");
            }
        }
    });
}
