use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use prodgrid_schema::SchemaRegistry;
use prodgrid_server::{build_app, AppState};
use prodgrid_store::Store;

#[derive(Parser, Debug)]
#[command(name = "prodgrid-server", about = "Carrier production ingestion and goal tracking")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8787")]
    bind: SocketAddr,

    /// Sqlite database path (created on first run)
    #[arg(long, default_value = "data/prodgrid.db")]
    db: PathBuf,

    /// Carrier registry TOML
    #[arg(long, default_value = "config/carriers.toml")]
    registry: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("prodgrid=info".parse()?),
        )
        .init();

    let args = Args::parse();

    if let Some(dir) = args.db.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }

    let registry = SchemaRegistry::from_path(&args.registry)?;
    let carriers = registry.carriers().count();
    let store = Store::open(&args.db)?;
    let state = AppState::new(store, registry);

    tracing::info!(bind = %args.bind, db = %args.db.display(), carriers, "starting");

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("shutdown signal: {e}");
    }
    tracing::info!("shutting down");
}
