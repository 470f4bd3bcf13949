use std::{net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::Parser;
use db::DBService;
use enact_server::{AppState, routes};
use services::services::config::{Config, ConfigOverrides, NotifierKind};
use tracing::{info, warn};
use utils::logging::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "enact", version, about = "Location-triggered parenting tips")]
struct Cli {
    /// Path to config.toml; defaults to the platform config directory.
    #[arg(long, env = "ENACT_CONFIG")]
    config: Option<PathBuf>,

    /// Address for the local control API.
    #[arg(long, env = "ENACT_BIND")]
    bind: Option<String>,

    /// ENACT backend base URL.
    #[arg(long, env = "ENACT_BASE_URL")]
    base_url: Option<String>,

    /// SQLite database file.
    #[arg(long, env = "ENACT_DATABASE", conflicts_with = "ephemeral")]
    database: Option<PathBuf>,

    /// Where notifications are shown: `desktop` or `log`.
    #[arg(long, env = "ENACT_NOTIFIER")]
    notifier: Option<NotifierKind>,

    /// Keep all state in memory.
    #[arg(long)]
    ephemeral: bool,

    #[arg(long, env = "ENACT_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_overrides(ConfigOverrides {
        base_url: cli.base_url,
        bind: cli.bind,
        database_path: cli.database,
        notifier: cli.notifier,
    });
    config.validate()?;

    let db = if cli.ephemeral {
        info!("Using in-memory database");
        DBService::new_in_memory().await?
    } else {
        let path = config.database_path()?;
        info!(path = %path.display(), "Opening database");
        DBService::new(&path)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?
    };

    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {:?}", config.server.bind))?;
    info!(backend = %config.backend.base_url, "Starting ENACT agent");

    let state = AppState::build(config, db).await?;
    match state.session().resume_from_store().await {
        Ok(true) => info!("Resumed stored session"),
        Ok(false) => info!("No stored session; waiting for sign-in"),
        Err(e) => warn!(error = %e, "Could not resume stored session"),
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(addr = %listener.local_addr()?, "Control API listening");

    axum::serve(listener, routes::router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.shutdown().await;
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
