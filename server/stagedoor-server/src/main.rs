use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use stagedoor_server::{create_app, StagedoorServer};
use stagedoor_sync::{SyncConfig, SyncDatabase, SyncDbConfig};
use tracing::{info, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Stagedoor sync server
#[derive(Parser, Debug)]
#[command(name = "stagedoor-server")]
#[command(about = "Offline sync API for the Stagedoor theater portal")]
struct Args {
    /// Server bind address
    #[arg(long, env = "STAGEDOOR_HOST", default_value = "0.0.0.0", global = true)]
    host: String,

    /// Server port
    #[arg(short, long, env = "STAGEDOOR_PORT", default_value = "8080", global = true)]
    port: u16,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create the database and its schema, then exit
    InitDb,
    /// Print a sync token for a user
    IssueToken {
        #[arg(long)]
        user_id: String,
        /// Lifetime in seconds; defaults to SYNC_TOKEN_TTL_SECS
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&args.host, args.port).await,
        Command::InitDb => init_db().await,
        Command::IssueToken { user_id, ttl_secs } => issue_token(&user_id, ttl_secs),
    }
}

async fn serve(host: &str, port: u16) -> anyhow::Result<()> {
    info!("Starting Stagedoor sync server v{}", env!("CARGO_PKG_VERSION"));

    let config = SyncConfig::from_env().context("Failed to load sync configuration")?;
    let server = StagedoorServer::from_config(&config)
        .await
        .context("Failed to initialise the sync engine")?;
    let app = create_app(server);

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid bind address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Sync API listening on http://{addr}");
    info!("Health check available at: http://{addr}/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("Server stopped");
    Ok(())
}

async fn init_db() -> anyhow::Result<()> {
    let config = SyncDbConfig::from_env();
    let db = SyncDatabase::connect(&config)
        .await
        .with_context(|| format!("Failed to initialise {}", config.database_url))?;
    db.close().await;

    info!(database_url = %config.database_url, "Database schema initialised");
    Ok(())
}

fn issue_token(user_id: &str, ttl_secs: Option<u64>) -> anyhow::Result<()> {
    let config = SyncConfig::from_env().context("Failed to load sync configuration")?;
    let ttl = ttl_secs.map_or(config.token_ttl, Duration::from_secs);
    let token = config.token_signer()?.create(user_id, ttl)?;

    println!("{token}");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("stagedoor_server={level},stagedoor_sync={level},tower_http=info,sqlx=warn").into()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .init();
}
