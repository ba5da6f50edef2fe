//! RGS settlement server binary

use clap::Parser;
use rgs::api::{init_tracing, ApiServer};
use rgs::{ConfigLoader, RgsMetrics, RocksStorage, SettlementOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "rgs")]
#[command(about = "RGS round settlement server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,

    /// Override the RocksDB data directory
    #[arg(long)]
    data_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(dir) = args.data_dir {
        config.storage.data_directory = dir;
    }
    config.validate()?;

    init_tracing(&config.logging);

    tracing::info!(data_dir = %config.storage.data_directory, "opening settlement store");
    let storage = Arc::new(RocksStorage::open_with_config(&config.storage)?);
    let metrics = Arc::new(RgsMetrics::new()?);
    let orchestrator = Arc::new(SettlementOrchestrator::open(storage, &config, metrics)?);

    ApiServer::new(config.server.clone(), orchestrator).run().await
}
