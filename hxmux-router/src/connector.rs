//! Process-backed worker connector
//!
//! Spawns each worker as a child process and speaks NDJSON over its
//! stdin/stdout: a writer task serializes commands from the session's
//! channel, a reader task parses worker lines per protocol mode and feeds
//! them into the dispatch loop. When the worker's stdout closes the reader
//! reaps the child and reports a single `Closed` event; `kill_on_drop`
//! ensures no worker outlives its router.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use hxmux_protocol::{LegacyMessage, ProtocolMode, WorkerCommand, WorkerMessage};
use hxmux_utils::{HxmuxError, Result};

use crate::registry::WorkerDefinition;
use crate::session::{WorkerConnector, WorkerEvent, WorkerEventTx, WorkerHandle};

pub struct ProcessConnector;

impl WorkerConnector for ProcessConnector {
    fn connect(&self, def: &WorkerDefinition, events: WorkerEventTx) -> Result<WorkerHandle> {
        let args = extra_args(&def.config);
        debug!(worker = %def.name, command = %def.endpoint, "Spawning worker process");

        let mut child = Command::new(&def.endpoint)
            .args(&args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HxmuxError::SpawnFailed(format!("{}: {}", def.endpoint, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HxmuxError::internal("worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HxmuxError::internal("worker stdout not captured"))?;

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_commands(stdin, commands_rx, events.worker().to_string()));

        let mode = def.mode;
        tokio::spawn(async move {
            read_worker_lines(stdout, mode, &events).await;

            // Reap the child so the exit status makes it into the report
            let reason = match child.wait().await {
                Ok(status) => format!("worker exited: {}", status),
                Err(e) => format!("worker exited (unreaped: {})", e),
            };
            events.send(WorkerEvent::Closed { reason }).await;
        });

        Ok(WorkerHandle {
            commands: commands_tx,
        })
    }
}

/// Optional string-array `args` from the worker's config entry
fn extra_args(config: &Value) -> Vec<String> {
    config
        .get("args")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

/// Serialize commands as JSON lines onto the worker's stdin
async fn write_commands(
    stdin: ChildStdin,
    mut commands: mpsc::UnboundedReceiver<WorkerCommand>,
    worker: String,
) {
    let mut stdin = BufWriter::new(stdin);

    while let Some(command) = commands.recv().await {
        let line = match serde_json::to_string(&command) {
            Ok(line) => line,
            Err(e) => {
                warn!(worker = %worker, "Failed to serialize worker command: {}", e);
                continue;
            }
        };

        let write = async {
            stdin.write_all(line.as_bytes()).await?;
            stdin.write_all(b"\n").await?;
            stdin.flush().await
        };
        if let Err(e) = write.await {
            // The reader side reports the failure; just stop writing
            warn!(worker = %worker, "Write to worker failed: {}", e);
            break;
        }
    }
}

/// Parse worker stdout lines per protocol mode until EOF or read error
///
/// Unparseable lines are logged and skipped; a single garbled line must
/// not take the worker channel down.
async fn read_worker_lines(stdout: ChildStdout, mode: ProtocolMode, events: &WorkerEventTx) {
    let mut reader = BufReader::new(stdout);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match parse_worker_line(trimmed, mode) {
                    Ok(event) => events.send(event).await,
                    Err(e) => {
                        warn!(
                            worker = %events.worker(),
                            "Skipping unparseable worker line: {}",
                            e
                        );
                    }
                }
            }
            Err(e) => {
                warn!(worker = %events.worker(), "Read from worker failed: {}", e);
                break;
            }
        }
    }
}

fn parse_worker_line(line: &str, mode: ProtocolMode) -> serde_json::Result<WorkerEvent> {
    match mode {
        ProtocolMode::Native => {
            serde_json::from_str::<WorkerMessage>(line).map(WorkerEvent::Native)
        }
        ProtocolMode::Legacy => {
            serde_json::from_str::<LegacyMessage>(line).map(WorkerEvent::Legacy)
        }
    }
}
