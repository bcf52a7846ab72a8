use anyhow::{Context, Result};
use clap::Parser;
use mate_feed::config::AppConfig;
use mate_feed::persistence::Persistence;
use std::env;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mate-feed")]
#[command(about = "Cursor-paginated conversation feeds with live updates")]
struct CliArgs {
    /// Path to a mate-feed.config.toml file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the API server to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// DuckDB database file
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load()?,
    };
    config.apply_env_overrides();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }
    config.validate()?;

    // Initialize logging based on config
    let default_directive = format!("mate_feed={}", config.logging.level.to_lowercase());
    let env_override = env::var("RUST_LOG").unwrap_or_default();
    let combined_filter = if env_override.trim().is_empty() {
        default_directive.clone()
    } else if env_override.contains("mate_feed") {
        env_override
    } else {
        format!("{},{}", env_override, default_directive)
    };

    tracing_subscriber::fmt()
        .with_env_filter(combined_filter)
        .with_target(true)
        .init();

    info!("{}", config.summary());

    let persistence = Persistence::new(&config.database.path)
        .with_context(|| format!("opening database {}", config.database.path.display()))?;

    serve(config, persistence.clone()).await?;

    persistence.checkpoint()?;
    info!("shut down cleanly");
    Ok(())
}

#[cfg(feature = "api")]
async fn serve(config: AppConfig, persistence: Persistence) -> Result<()> {
    use mate_feed::api::{ApiConfig, ApiServer};

    let server = ApiServer::new(ApiConfig::from_app_config(&config), persistence, config);
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
        })
        .await
}

#[cfg(not(feature = "api"))]
async fn serve(_config: AppConfig, _persistence: Persistence) -> Result<()> {
    anyhow::bail!("mate-feed was built without the `api` feature; nothing to serve")
}
