use crate::registry::WorkerRegistry;
use plagued_common::{ClientCommand, QueryArgs};
use plagued_wire::{Connection, Message, Opcode, Result as WireResult};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{info, warn};

const UNKNOWN_COMMAND: &str = "Unknown command.";
const COUNTRY_NOT_FOUND: &str = "Country not found.";
const PATIENT_NOT_FOUND: &str = "Patient not found.";
const WORKER_UNAVAILABLE: &str = "Worker unavailable.";

/// Serve one client connection: read the request, route it across the
/// shards, stream the result lines back and close with the handshake.
pub async fn handle_client<S>(registry: &WorkerRegistry, stream: S) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut conn = Connection::new(stream);
    let msg = conn.recv().await?;

    let results = if msg.opcode == Opcode::ClientRequest {
        let line = msg.body_text();
        let results = answer(registry, &line).await;
        info!(query = %line.trim_end(), results = results.len(), "answered client request");
        results
    } else {
        warn!(opcode = ?msg.opcode, "unexpected opcode on the query port");
        vec![UNKNOWN_COMMAND.to_string()]
    };

    for line in &results {
        conn.send_text(Opcode::RequestResult, line.as_str()).await?;
    }
    conn.send_end().await?;
    conn.await_receipt().await
}

/// Resolve one command line into its result lines, consulting whichever
/// workers the routing rules require.
pub async fn answer(registry: &WorkerRegistry, line: &str) -> Vec<String> {
    let cmd = match ClientCommand::parse(line) {
        Ok(cmd) => cmd,
        Err(err) => {
            warn!(query = %line.trim_end(), %err, "rejected client command");
            return vec![UNKNOWN_COMMAND.to_string()];
        }
    };

    match cmd {
        ClientCommand::SearchPatient { record_id } => search_patient(registry, &record_id).await,
        ClientCommand::DiseaseFrequency { args } => {
            summed_count(registry, Opcode::DiseaseFrequency, &args).await
        }
        ClientCommand::NumAdmissions { args } => {
            summed_count(registry, Opcode::NumAdmissions, &args).await
        }
        ClientCommand::NumDischarges { args } => discharge_lines(registry, &args).await,
        ClientCommand::TopkAgeRanges { ref country, .. } => {
            let Some(addr) = registry.lookup(country) else {
                return vec![COUNTRY_NOT_FOUND.to_string()];
            };
            match ask_worker(addr, Opcode::TopkAgeRanges, line).await {
                Ok(msgs) => msgs.into_iter().map(|m| m.body_text()).collect(),
                Err(err) => {
                    warn!(%addr, %err, "topk worker query failed");
                    vec![WORKER_UNAVAILABLE.to_string()]
                }
            }
        }
    }
}

/// Ask every worker in roster order until one claims the record.
async fn search_patient(registry: &WorkerRegistry, record_id: &str) -> Vec<String> {
    for addr in registry.workers() {
        match ask_worker(addr, Opcode::SearchPatient, record_id).await {
            Ok(msgs) => {
                if let Some(hit) = msgs.iter().find(|m| m.opcode == Opcode::SearchSuccess) {
                    return vec![hit.body_text()];
                }
            }
            Err(err) => warn!(%addr, %err, "search worker query failed"),
        }
    }
    vec![PATIENT_NOT_FOUND.to_string()]
}

/// Frequency/admission counting: route to the owning worker when a
/// country is given, otherwise fan out and sum the per-worker totals.
async fn summed_count(registry: &WorkerRegistry, opcode: Opcode, args: &QueryArgs) -> Vec<String> {
    let body = args.encode();
    match args.country.as_deref() {
        Some(country) => {
            let Some(addr) = registry.lookup(country) else {
                return vec![COUNTRY_NOT_FOUND.to_string()];
            };
            match ask_worker(addr, opcode, &body).await {
                Ok(msgs) => msgs.into_iter().map(|m| m.body_text()).collect(),
                Err(err) => {
                    warn!(%addr, %err, "routed count query failed");
                    vec![WORKER_UNAVAILABLE.to_string()]
                }
            }
        }
        None => {
            let mut total: u64 = 0;
            for addr in registry.workers() {
                match ask_worker(addr, opcode, &body).await {
                    Ok(msgs) => {
                        for msg in msgs {
                            match msg.body_text().trim().parse::<u64>() {
                                Ok(count) => total += count,
                                Err(_) => warn!(%addr, "non-numeric count from worker"),
                            }
                        }
                    }
                    Err(err) => warn!(%addr, %err, "fan-out count query failed"),
                }
            }
            vec![total.to_string()]
        }
    }
}

/// Discharge counting keeps per-country lines instead of one sum.
async fn discharge_lines(registry: &WorkerRegistry, args: &QueryArgs) -> Vec<String> {
    let body = args.encode();
    match args.country.as_deref() {
        Some(country) => {
            let Some(addr) = registry.lookup(country) else {
                return vec![COUNTRY_NOT_FOUND.to_string()];
            };
            match ask_worker(addr, Opcode::NumDischarges, &body).await {
                Ok(msgs) => msgs.into_iter().map(|m| m.body_text()).collect(),
                Err(err) => {
                    warn!(%addr, %err, "routed discharge query failed");
                    vec![WORKER_UNAVAILABLE.to_string()]
                }
            }
        }
        None => {
            let mut lines = Vec::new();
            for addr in registry.workers() {
                match ask_worker(addr, Opcode::NumDischarges, &body).await {
                    Ok(msgs) => lines.extend(msgs.into_iter().map(|m| m.body_text())),
                    Err(err) => warn!(%addr, %err, "fan-out discharge query failed"),
                }
            }
            lines
        }
    }
}

/// One full request/response exchange with a worker: connect, send,
/// collect result messages up to the end marker, complete the handshake.
async fn ask_worker(addr: SocketAddr, opcode: Opcode, body: &str) -> WireResult<Vec<Message>> {
    let stream = TcpStream::connect(addr).await?;
    let mut conn = Connection::new(stream);
    conn.send_text(opcode, body).await?;

    let mut msgs = Vec::new();
    loop {
        let msg = conn.recv().await?;
        if msg.opcode == Opcode::EndOfTransmission {
            break;
        }
        msgs.push(msg);
    }
    conn.confirm_received().await?;
    Ok(msgs)
}
