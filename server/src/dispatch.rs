use crate::config::ServerConfig;
use crate::queries;
use crate::queue::ConnQueue;
use crate::registry::WorkerRegistry;
use anyhow::Context;
use plagued_common::FileReport;
use plagued_wire::{Connection, Opcode, Result as WireResult};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tracing::{info, warn};

/// Absorb one worker registration stream: the listening announcement,
/// the per-file reports that reveal which countries the worker owns,
/// the end marker, then the acknowledgment.
///
/// A replacement announcement patches the existing slot instead of
/// growing the roster; its report stream is drained for the first
/// country only.
pub async fn handle_registration<S>(
    registry: &WorkerRegistry,
    stream: S,
    peer_ip: IpAddr,
) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(stream);
    let hello = conn.recv().await?;
    let replacement = match hello.opcode {
        Opcode::WorkerListening => false,
        Opcode::WorkerListeningReplacement => true,
        other => {
            warn!(?other, "unexpected opcode on the statistics port");
            return Ok(());
        }
    };

    let body = hello.body_text();
    let Ok(port) = body.trim().parse::<u16>() else {
        warn!(body = %body.trim(), "unparseable worker port");
        return Ok(());
    };
    let addr = SocketAddr::new(peer_ip, port);

    let mut countries: Vec<String> = Vec::new();
    let mut patched = false;
    loop {
        let msg = conn.recv().await?;
        match msg.opcode {
            Opcode::FileReport | Opcode::FileReportReplacement => {
                let body = msg.body_text();
                let Ok(country) = FileReport::country_of(&body) else {
                    warn!(%addr, "malformed file report");
                    continue;
                };
                if replacement {
                    if !patched {
                        patched = registry.patch(country, addr);
                        if !patched {
                            warn!(%addr, country, "replacement for an unknown slot");
                        }
                    }
                } else if !countries.iter().any(|c| c == country) {
                    countries.push(country.to_string());
                }
            }
            Opcode::EndOfTransmission => break,
            other => warn!(?other, "unexpected opcode in a registration stream"),
        }
    }

    if !replacement {
        registry.register(addr, &countries);
    }
    conn.send_text(Opcode::ResponseReceived, "0").await
}

/// One accepted connection waiting in the bounded queue, tagged with the
/// listener that produced it.
#[derive(Debug)]
pub enum QueuedConn {
    Worker(TcpStream, IpAddr),
    Client(TcpStream),
}

/// Bound addresses and shared state of a running server, for callers
/// that need to reach it (and for tests binding ephemeral ports).
pub struct ServerHandle {
    pub stats_addr: SocketAddr,
    pub query_addr: SocketAddr,
    pub registry: Arc<WorkerRegistry>,
}

/// Bind both listeners and spawn the accept tasks plus the fixed handler
/// pool. Worker registrations and client queries share the one bounded
/// queue, so the statistics port is held to the same capacity bound;
/// when the queue fills, both acceptors stall and the kernel backlog
/// takes the overflow.
pub async fn serve(config: &ServerConfig) -> anyhow::Result<ServerHandle> {
    let registry = Arc::new(WorkerRegistry::new());
    let queue: Arc<ConnQueue<QueuedConn>> = Arc::new(ConnQueue::new(config.queue_size));

    let stats = TcpListener::bind((config.host.as_str(), config.stats_port))
        .await
        .with_context(|| format!("binding statistics port {}", config.stats_port))?;
    let clients = TcpListener::bind((config.host.as_str(), config.query_port))
        .await
        .with_context(|| format!("binding query port {}", config.query_port))?;
    let stats_addr = stats.local_addr()?;
    let query_addr = clients.local_addr()?;
    info!(%stats_addr, %query_addr, "query server listening");

    let stats_queue = queue.clone();
    tokio::spawn(async move {
        loop {
            match stats.accept().await {
                Ok((stream, peer)) => {
                    stats_queue.push(QueuedConn::Worker(stream, peer.ip())).await
                }
                Err(err) => warn!(%err, "statistics accept failed"),
            }
        }
    });

    let client_queue = queue.clone();
    tokio::spawn(async move {
        loop {
            match clients.accept().await {
                Ok((stream, _)) => client_queue.push(QueuedConn::Client(stream)).await,
                Err(err) => warn!(%err, "query accept failed"),
            }
        }
    });

    for handler in 0..config.num_handlers {
        let queue = queue.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            loop {
                match queue.pop().await {
                    QueuedConn::Worker(stream, peer_ip) => {
                        if let Err(err) = handle_registration(&registry, stream, peer_ip).await {
                            warn!(handler, %err, "worker registration failed");
                        }
                    }
                    QueuedConn::Client(stream) => {
                        if let Err(err) = queries::handle_client(&registry, stream).await {
                            warn!(handler, %err, "client connection failed");
                        }
                    }
                }
            }
        });
    }

    Ok(ServerHandle {
        stats_addr,
        query_addr,
        registry,
    })
}

/// Run the server until ctrl-c.
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    serve(&config).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
