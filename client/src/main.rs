use anyhow::Context;
use clap::Parser;
use plagued_client::QueryClient;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Barrier;
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "plagued-client", about = "Batch query client")]
struct Args {
    /// Query server address, e.g. 127.0.0.1:7654
    #[arg(long)]
    server: SocketAddr,

    /// File with one query command per line
    #[arg(long)]
    query_file: PathBuf,

    /// Concurrent requests per wave
    #[arg(long, default_value_t = 4)]
    num_tasks: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.num_tasks > 0, "need at least one task per wave");

    let contents = tokio::fs::read_to_string(&args.query_file)
        .await
        .with_context(|| format!("reading {}", args.query_file.display()))?;
    let queries: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let client = QueryClient::new(args.server);
    for wave in queries.chunks(args.num_tasks) {
        // Every task in the wave lines up at the barrier so the wave's
        // requests hit the server together.
        let barrier = Arc::new(Barrier::new(wave.len()));
        let mut tasks = Vec::with_capacity(wave.len());
        for line in wave {
            let line = line.clone();
            let barrier = barrier.clone();
            tasks.push(tokio::spawn(async move {
                barrier.wait().await;
                let result = client.request(&line).await;
                (line, result)
            }));
        }

        for task in tasks {
            let (line, result) = task.await?;
            match result {
                Ok(results) => {
                    println!("{line}");
                    for result in results {
                        println!("  {result}");
                    }
                }
                // A single failed request never sinks the batch.
                Err(err) => error!(query = %line, %err, "request failed"),
            }
        }
    }
    Ok(())
}
