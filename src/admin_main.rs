//! RGS admin tool: math model registration and audit inspection against the
//! server's RocksDB directory. Run it while the server is stopped.

use clap::{Parser, Subcommand};
use rgs::api::init_tracing;
use rgs::{ConfigLoader, MathModel, RgsMetrics, RocksStorage, SettlementOrchestrator};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "rgs-admin")]
#[command(about = "Inspect and seed the RGS settlement store", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    /// Override the RocksDB data directory
    #[arg(long, global = true)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a math model from a JSON file
    Register { path: PathBuf },
    /// Print a registered math model
    Show { model_id: String },
    /// Print the most recent settlements, oldest first
    Audit {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &args.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(dir) = args.data_dir {
        config.storage.data_directory = dir;
    }
    init_tracing(&config.logging);

    let storage = Arc::new(RocksStorage::open_with_config(&config.storage)?);
    let orchestrator =
        SettlementOrchestrator::open(storage, &config, Arc::new(RgsMetrics::new()?))?;

    match args.command {
        Command::Register { path } => {
            let model: MathModel = serde_json::from_slice(&std::fs::read(&path)?)?;
            if model.model_id.trim().is_empty() {
                return Err(format!("{}: model_id required", path.display()).into());
            }
            let model_id = model.model_id.clone();
            orchestrator.register_math_model(model)?;
            println!("registered {}", model_id);
        }
        Command::Show { model_id } => match orchestrator.get_math_model(&model_id) {
            Some(model) => {
                println!("{}", serde_json::to_string_pretty(model.as_ref())?);
                if let Some(rtp) = model.weighted_return() {
                    println!("weighted return: {:.6}", rtp);
                }
                if let Some(stats) = &model.stats {
                    println!("declared rtp (informational): {:.6}", stats.computed_rtp);
                }
            }
            None => return Err(format!("no math model '{}'", model_id).into()),
        },
        Command::Audit { limit } => {
            for result in orchestrator.audit_log(limit)? {
                println!("{}", serde_json::to_string(&result)?);
            }
        }
    }

    Ok(())
}
