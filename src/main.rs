mod cli;

use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Commands, IngestArgs, PruneArgs};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ingestbox::api;
use ingestbox::config::Config;
use ingestbox::ledger::JobLedger;
use ingestbox::storage::StorageClient;
use ingestbox::transfer::{ChunkDriver, RemoteJob, prune_stale};

type AnyError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Server(args) => {
            let address = args.address.unwrap_or(config.server.bind_addr);
            api::run(address, config).await?
        }
        Commands::Ingest(args) => ingest(args, &config).await?,
        Commands::Prune(args) => prune(args, &config).await?,
        Commands::Config => print!("{}", toml::to_string_pretty(&config)?),
    }

    Ok(())
}

async fn ingest(args: IngestArgs, config: &Config) -> Result<(), AnyError> {
    let job_id = args
        .job_id
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    let mut driver_config = config.driver.clone();
    if let Some(workers) = args.workers {
        driver_config.workers = workers;
    }

    let service = Arc::new(RemoteJob::new(&args.server, job_id)?);
    let driver = ChunkDriver::from_config(service, &driver_config);
    let report = driver.run(&args.source_url, &args.filename).await?;

    info!(job_id = %report.job_id, object_key = %report.object_key, "Transfer complete");
    println!("{report}");
    Ok(())
}

async fn prune(args: PruneArgs, config: &Config) -> Result<(), AnyError> {
    let ttl_days = args.ttl_days.unwrap_or(config.retention.job_ttl_days);
    let ledger = JobLedger::open(&config.server.ledger_path)?;
    let storage = StorageClient::from_config(&config.storage)?;
    let stats = prune_stale(&ledger, &storage, ttl_days).await?;

    println!(
        "pruned {} jobs and {} parts idle for over {} days, aborted {} uploads",
        stats.jobs_pruned, stats.parts_pruned, ttl_days, stats.uploads_aborted
    );
    if stats.jobs_kept > 0 {
        println!("kept {} jobs whose uploads could not be aborted", stats.jobs_kept);
    }
    Ok(())
}
