use anyhow::Context;
use plagued_common::ServerInfo;
use plagued_wire::{write_message, Message, Opcode};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pause before retrying a respawn that itself failed.
const RESPAWN_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the worker executable.
    pub worker_bin: PathBuf,
    /// Root directory holding one subdirectory of record files per country.
    pub input_dir: PathBuf,
    /// Statistics endpoint of the query server, handed to every worker.
    pub server: ServerInfo,
    /// Number of worker processes to keep alive.
    pub num_workers: usize,
}

/// Splits the discovered countries round-robin across `num_workers`
/// slots, in sorted country order. Slots past the country count come
/// back empty.
pub fn assign_round_robin(countries: &[String], num_workers: usize) -> Vec<Vec<String>> {
    let mut slots = vec![Vec::new(); num_workers];
    for (i, country) in countries.iter().enumerate() {
        slots[i % num_workers].push(country.clone());
    }
    slots
}

/// Write one worker's full command stream: the statistics endpoint, one
/// directory assignment per country, then the end marker.
pub async fn send_assignments<W>(
    writer: &mut W,
    server: &ServerInfo,
    countries: &[String],
    replacement: bool,
) -> plagued_wire::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_message(writer, &Message::text(Opcode::ServerInfo, server.encode())).await?;
    let opcode = if replacement {
        Opcode::ReadDirReplacement
    } else {
        Opcode::ReadDir
    };
    for country in countries {
        write_message(writer, &Message::text(opcode, country.as_str())).await?;
    }
    write_message(writer, &Message::text(Opcode::EndOfTransmission, "0")).await?;
    writer.flush().await?;
    Ok(())
}

/// Keeps `num_workers` shard servers alive. Each slot owns a fixed set of
/// countries; when a worker dies, its replacement is spawned into the
/// same slot and told to re-announce its shards.
pub struct Supervisor {
    config: SupervisorConfig,
    assignments: Vec<Vec<String>>,
    exits: mpsc::Receiver<(usize, std::io::Result<ExitStatus>)>,
    exit_tx: mpsc::Sender<(usize, std::io::Result<ExitStatus>)>,
    monitors: JoinSet<()>,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Discover the country directories under the input root and lay out
    /// the shard assignments. No worker is spawned yet.
    pub async fn new(config: SupervisorConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(config.num_workers > 0, "need at least one worker");

        let mut countries = Vec::new();
        let mut entries = tokio::fs::read_dir(&config.input_dir)
            .await
            .with_context(|| format!("reading input root {}", config.input_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                countries.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        anyhow::ensure!(!countries.is_empty(), "no country directories found");
        countries.sort();

        let assignments = assign_round_robin(&countries, config.num_workers);
        info!(
            countries = countries.len(),
            workers = config.num_workers,
            "laid out shard assignments"
        );

        let (exit_tx, exits) = mpsc::channel(config.num_workers.max(1));
        Ok(Supervisor {
            config,
            assignments,
            exits,
            exit_tx,
            monitors: JoinSet::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn assignments(&self) -> &[Vec<String>] {
        &self.assignments
    }

    /// Spawn the whole fleet, then supervise: respawn on exit, kill and
    /// reap everything on ctrl-c.
    pub async fn run(mut self) -> anyhow::Result<()> {
        for slot in 0..self.assignments.len() {
            self.spawn_worker(slot, false).await?;
        }

        loop {
            tokio::select! {
                Some((slot, status)) = self.exits.recv() => {
                    self.handle_exit(slot, status).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutting down worker fleet");
                    self.shutdown.cancel();
                    while self.monitors.join_next().await.is_some() {}
                    return Ok(());
                }
            }
        }
    }

    /// Replace the worker in `slot`. A failed spawn (unspawnable binary,
    /// a child that dies before reading its command stream) is retried
    /// after a delay; it never takes the supervisor down.
    async fn handle_exit(&mut self, slot: usize, status: std::io::Result<ExitStatus>) {
        warn!(slot, ?status, "worker exited, spawning replacement");
        if let Err(err) = self.spawn_worker(slot, true).await {
            warn!(slot, %err, "respawn failed, retrying");
            let exit_tx = self.exit_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(RESPAWN_RETRY_DELAY).await;
                let _ = exit_tx
                    .send((slot, Err(std::io::Error::other("respawn retry"))))
                    .await;
            });
        }
    }

    /// Spawn one worker into `slot` and feed it its command stream. The
    /// child is handed off to a monitor task that reports its exit.
    async fn spawn_worker(&mut self, slot: usize, replacement: bool) -> anyhow::Result<()> {
        let countries = &self.assignments[slot];
        let mut command = Command::new(&self.config.worker_bin);
        command
            .arg("--input-dir")
            .arg(&self.config.input_dir)
            .stdin(Stdio::piped())
            // A child abandoned by a failed stdin write still gets reaped.
            .kill_on_drop(true);
        if replacement {
            command.arg("--replacement");
        }
        let mut child = command
            .spawn()
            .with_context(|| format!("spawning {}", self.config.worker_bin.display()))?;

        let mut stdin = child
            .stdin
            .take()
            .context("worker spawned without a stdin pipe")?;
        send_assignments(&mut stdin, &self.config.server, countries, replacement).await?;
        // Closing the pipe here is fine: the worker stops reading its
        // stdin once it has seen the end marker.
        drop(stdin);

        info!(
            slot,
            pid = child.id(),
            replacement,
            countries = countries.len(),
            "worker running"
        );

        let exit_tx = self.exit_tx.clone();
        let shutdown = self.shutdown.clone();
        self.monitors.spawn(async move {
            tokio::select! {
                status = child.wait() => {
                    let _ = exit_tx.send((slot, status)).await;
                }
                _ = shutdown.cancelled() => {
                    if let Err(err) = child.kill().await {
                        warn!(slot, %err, "failed to kill worker");
                    }
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn countries(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn round_robin_covers_every_country_once() {
        let slots = assign_round_robin(&countries(&["A", "B", "C", "D", "E"]), 2);
        assert_eq!(slots[0], countries(&["A", "C", "E"]));
        assert_eq!(slots[1], countries(&["B", "D"]));

        // More workers than countries leaves trailing slots empty.
        let slots = assign_round_robin(&countries(&["A"]), 3);
        assert_eq!(slots[0], countries(&["A"]));
        assert!(slots[1].is_empty() && slots[2].is_empty());
    }

    #[tokio::test]
    async fn discovery_lays_out_sorted_country_directories() {
        let dir = tempfile::tempdir().unwrap();
        for country in ["Peru", "Spain", "Chile"] {
            std::fs::create_dir(dir.path().join(country)).unwrap();
        }
        // Stray files at the root are not shards.
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let supervisor = Supervisor::new(SupervisorConfig {
            worker_bin: "plagued-worker".into(),
            input_dir: dir.path().to_path_buf(),
            server: ServerInfo {
                host: "127.0.0.1".into(),
                port: 7777,
            },
            num_workers: 2,
        })
        .await
        .unwrap();

        assert_eq!(
            supervisor.assignments(),
            &[countries(&["Chile", "Spain"]), countries(&["Peru"])]
        );
    }

    #[tokio::test]
    async fn failed_respawn_retries_instead_of_aborting() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Spain")).unwrap();

        let mut supervisor = Supervisor::new(SupervisorConfig {
            worker_bin: dir.path().join("no-such-binary"),
            input_dir: dir.path().to_path_buf(),
            server: ServerInfo {
                host: "127.0.0.1".into(),
                port: 7777,
            },
            num_workers: 1,
        })
        .await
        .unwrap();

        // The dead slot's replacement cannot spawn; the supervisor must
        // absorb that and schedule a retry event rather than bail.
        supervisor
            .handle_exit(0, Err(std::io::Error::other("worker died")))
            .await;

        let (slot, status) =
            tokio::time::timeout(std::time::Duration::from_secs(5), supervisor.exits.recv())
                .await
                .expect("retry event should arrive")
                .expect("exit channel open");
        assert_eq!(slot, 0);
        assert!(status.is_err());
    }

    #[tokio::test]
    async fn empty_input_root_is_a_setup_fault() {
        let dir = tempfile::tempdir().unwrap();
        let result = Supervisor::new(SupervisorConfig {
            worker_bin: "plagued-worker".into(),
            input_dir: dir.path().to_path_buf(),
            server: ServerInfo {
                host: "127.0.0.1".into(),
                port: 7777,
            },
            num_workers: 2,
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn assignment_stream_frames_in_order() {
        let server = ServerInfo {
            host: "127.0.0.1".into(),
            port: 7777,
        };
        let mut buf = Vec::new();
        send_assignments(&mut buf, &server, &countries(&["Spain", "Peru"]), true)
            .await
            .unwrap();

        let mut reader = &buf[..];
        let info = plagued_wire::read_message(&mut reader).await.unwrap();
        assert_eq!(info.opcode, Opcode::ServerInfo);
        assert_eq!(info.body_text(), "127.0.0.1!7777");

        for expected in ["Spain", "Peru"] {
            let msg = plagued_wire::read_message(&mut reader).await.unwrap();
            assert_eq!(msg.opcode, Opcode::ReadDirReplacement);
            assert_eq!(msg.body_text(), expected);
        }
        let end = plagued_wire::read_message(&mut reader).await.unwrap();
        assert_eq!(end.opcode, Opcode::EndOfTransmission);
        assert!(reader.is_empty());
    }
}
