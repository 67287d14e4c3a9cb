use clap::Parser;
use plagued_server::{run_server, ServerConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "plagued-server", about = "Sharded patient record query server")]
struct Args {
    /// Optional YAML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(long)]
    host: Option<String>,

    /// Override the client query port
    #[arg(long)]
    query_port: Option<u16>,

    /// Override the worker statistics port
    #[arg(long)]
    stats_port: Option<u16>,

    /// Override the pending-connection queue capacity
    #[arg(long)]
    queue_size: Option<usize>,

    /// Override the handler pool size
    #[arg(long)]
    num_handlers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = ServerConfig::load(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.query_port {
        config.query_port = port;
    }
    if let Some(port) = args.stats_port {
        config.stats_port = port;
    }
    if let Some(size) = args.queue_size {
        config.queue_size = size;
    }
    if let Some(n) = args.num_handlers {
        config.num_handlers = n;
    }

    run_server(config).await
}
