use plagued_common::FileReport;
use plagued_store::{scan_country, CaseStats, ShardStore, StoreError};
use plagued_wire::{Connection, Opcode, Result as WireResult};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Wire(#[from] plagued_wire::WireError),
}

/// Everything a worker owns: the shard store, the topk stats table, the
/// list of assigned countries and the per-country set of already
/// ingested file names (for incremental rescans).
///
/// Built once in `main` and passed to every handler explicitly.
#[derive(Debug)]
pub struct WorkerState {
    pub input_dir: PathBuf,
    pub store: ShardStore,
    pub stats: CaseStats,
    pub countries: Vec<String>,
    seen_files: HashMap<String, HashSet<String>>,
}

impl WorkerState {
    pub fn new(input_dir: PathBuf) -> Self {
        WorkerState {
            input_dir,
            store: ShardStore::new(),
            stats: CaseStats::new(),
            countries: Vec::new(),
            seen_files: HashMap::new(),
        }
    }

    /// Ingest one assigned country directory and stream a report per
    /// file to the query server as loading progresses.
    pub async fn load_country<S>(
        &mut self,
        country: &str,
        server: &mut Connection<S>,
        replacement: bool,
    ) -> Result<(), WorkerError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let seen = self.seen_files.entry(country.to_string()).or_default();
        let outcome =
            scan_country(&mut self.store, &mut self.stats, &self.input_dir, country, seen).await?;

        let opcode = if replacement {
            Opcode::FileReportReplacement
        } else {
            Opcode::FileReport
        };
        for report in &outcome.reports {
            server.send_text(opcode, report.encode()).await?;
        }

        if !self.countries.iter().any(|c| c == country) {
            self.countries.push(country.to_string());
        }
        info!(
            country,
            files = outcome.reports.len(),
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            "loaded shard directory"
        );
        Ok(())
    }

    /// Re-scan every assigned country for record files that appeared
    /// after the initial load. Already-seen files are skipped; the
    /// reports for the new files are returned so the caller can stream
    /// them to the query server.
    pub async fn rescan(&mut self) -> Result<Vec<FileReport>, WorkerError> {
        let mut fresh = Vec::new();
        let countries = self.countries.clone();
        for country in countries {
            let seen = self.seen_files.entry(country.clone()).or_default();
            let outcome =
                scan_country(&mut self.store, &mut self.stats, &self.input_dir, &country, seen)
                    .await?;
            if !outcome.reports.is_empty() {
                info!(
                    country,
                    files = outcome.reports.len(),
                    "ingested new record files"
                );
                fresh.extend(outcome.reports);
            }
        }
        Ok(fresh)
    }
}

/// Drain the master's command stream: `ServerInfo` has already been
/// consumed by the caller; what follows is one `ReadDir` (or
/// `ReadDirReplacement`) per assigned country, closed by an end marker.
pub async fn obey_master<M, S>(
    state: &mut WorkerState,
    master: &mut M,
    server: &mut Connection<S>,
) -> Result<(), WorkerError>
where
    M: AsyncRead + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let msg = plagued_wire::read_message(master).await?;
        match msg.opcode {
            Opcode::ReadDir | Opcode::ReadDirReplacement => {
                let country = msg.body_text();
                let replacement = msg.opcode == Opcode::ReadDirReplacement;
                state.load_country(&country, server, replacement).await?;
            }
            Opcode::EndOfTransmission => return Ok(()),
            other => warn!(?other, "unexpected command from master"),
        }
    }
}

/// Close the statistics stream: end marker out, acknowledgment in.
pub async fn finish_registration<S>(server: &mut Connection<S>) -> WireResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    server.send_end().await?;
    server.recv().await?;
    Ok(())
}
