//! pushbridge - Pub/Sub push endpoint that streams deliveries into BigQuery
//!
//! Requires BQ_PROJECT_ID, BQ_DATASET_ID and BQ_TABLE_ID in the environment.

use clap::Parser;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use pushbridge::{router, AppState, BigQueryClient, BridgeConfig};

#[derive(Parser)]
#[command(name = "pushbridge")]
#[command(version, about = "Pub/Sub push to BigQuery bridge", long_about = None)]
struct Cli {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: std::net::IpAddr,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = BridgeConfig::from_env()?;

    // One client for the process lifetime, shared by all requests
    let client = BigQueryClient::from_config(&config)?;
    if config.access_token.is_none() {
        tracing::info!("Using metadata server at {} for access tokens", config.metadata_host);
    }

    let state = Arc::new(AppState::new(Arc::new(client), config.table.clone()));
    let app = router(state);

    let addr = SocketAddr::new(cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("pushbridge listening on {}", addr);
    tracing::info!("Writing rows to {}", config.table);

    axum::serve(listener, app).await?;
    Ok(())
}
