use anyhow::Context;
use clap::Parser;
use plagued_common::{FileReport, ServerInfo};
use plagued_wire::{Connection, Opcode};
use plagued_worker::{handle_query, WorkerState};
use std::path::PathBuf;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "plagued-worker", about = "Shard server for patient records")]
struct Args {
    /// Root directory holding one subdirectory of record files per country
    #[arg(long)]
    input_dir: PathBuf,

    /// This worker replaces a crashed one and re-announces its shards
    #[arg(long)]
    replacement: bool,
}

/// Push reports discovered after startup to the query server. The
/// replacement announcement re-uses the existing registry slot instead
/// of registering this worker a second time.
async fn announce_reports(
    server_info: &ServerInfo,
    port: u16,
    reports: &[FileReport],
) -> anyhow::Result<()> {
    let stream = TcpStream::connect((server_info.host.as_str(), server_info.port)).await?;
    let mut server = Connection::new(stream);
    server
        .send_text(Opcode::WorkerListeningReplacement, port.to_string())
        .await?;
    for report in reports {
        server
            .send_text(Opcode::FileReportReplacement, report.encode())
            .await?;
    }
    plagued_worker::state::finish_registration(&mut server).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut state = WorkerState::new(args.input_dir);

    // The master speaks first, over our stdin: the statistics endpoint,
    // then one directory assignment per country, then an end marker.
    let mut master = tokio::io::stdin();
    let info_msg = plagued_wire::read_message(&mut master)
        .await
        .context("reading statistics endpoint from commander")?;
    if info_msg.opcode != Opcode::ServerInfo {
        anyhow::bail!("expected server info, got {:?}", info_msg.opcode);
    }
    let server_info = ServerInfo::decode(&info_msg.body_text())?;

    let listener = TcpListener::bind(("0.0.0.0", 0))
        .await
        .context("binding query listener")?;
    let port = listener.local_addr()?.port();
    info!(port, "listening for queries");

    let stats_stream = TcpStream::connect((server_info.host.as_str(), server_info.port))
        .await
        .with_context(|| format!("connecting to statistics endpoint {}", server_info.encode()))?;
    let mut server = Connection::new(stats_stream);

    let announce = if args.replacement {
        Opcode::WorkerListeningReplacement
    } else {
        Opcode::WorkerListening
    };
    server.send_text(announce, port.to_string()).await?;

    plagued_worker::state::obey_master(&mut state, &mut master, &mut server).await?;
    plagued_worker::state::finish_registration(&mut server).await?;
    info!(
        countries = state.countries.len(),
        records = state.store.len(),
        "registration complete"
    );

    let mut rescan = signal(SignalKind::user_defined1()).context("installing SIGUSR1 handler")?;
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted.context("accepting query connection")?;
                // One query at a time; a shard answers fast enough that
                // concurrency lives at the dispatcher, not here.
                if let Err(err) = handle_query(&state, stream).await {
                    warn!(%peer, %err, "query connection failed");
                }
            }
            _ = rescan.recv() => {
                info!("rescanning assigned directories");
                match state.rescan().await {
                    Ok(reports) if !reports.is_empty() => {
                        if let Err(err) = announce_reports(&server_info, port, &reports).await {
                            error!(%err, "failed to stream rescan reports");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => error!(%err, "rescan failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                return Ok(());
            }
        }
    }
}
