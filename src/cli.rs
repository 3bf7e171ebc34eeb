use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "ingestbox")]
#[command(about = "Copy HTTP resources into object storage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the job API
    Server(ServerArgs),
    /// Drive one transfer against a running server
    Ingest(IngestArgs),
    /// Remove ledger records not updated within the retention window
    Prune(PruneArgs),
    /// Print the resolved configuration as TOML
    Config,
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (defaults to `server.bind_addr`)
    #[arg(long)]
    pub address: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct IngestArgs {
    /// Base URL of the IngestBox API
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Job id; a fresh UUIDv7 when omitted
    #[arg(long)]
    pub job_id: Option<String>,

    /// Concurrent chunk workers (defaults to `driver.workers`)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Resource to copy
    pub source_url: String,

    /// Name of the stored object, relative to `transfer.key_prefix`
    pub filename: String,
}

#[derive(clap::Args, Debug)]
pub struct PruneArgs {
    /// Override `retention.job_ttl_days`
    #[arg(long)]
    pub ttl_days: Option<u32>,
}
