use clap::Parser;
use plagued_common::ServerInfo;
use plagued_master::{Supervisor, SupervisorConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "plagued-master", about = "Worker fleet commander")]
struct Args {
    /// Number of worker processes
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Root directory holding one subdirectory of record files per country
    #[arg(long)]
    input_dir: PathBuf,

    /// Host of the query server's statistics endpoint
    #[arg(long, default_value = "127.0.0.1")]
    server_host: String,

    /// Port of the query server's statistics endpoint
    #[arg(long)]
    server_port: u16,

    /// Worker executable to spawn
    #[arg(long, default_value = "plagued-worker")]
    worker_bin: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let supervisor = Supervisor::new(SupervisorConfig {
        worker_bin: args.worker_bin,
        input_dir: args.input_dir,
        server: ServerInfo {
            host: args.server_host,
            port: args.server_port,
        },
        num_workers: args.workers,
    })
    .await?;

    supervisor.run().await
}
