//! hxmux router daemon
//!
//! Speaks NDJSON with the caller over stdin/stdout: stdout carries protocol
//! frames only, so logs go to a file. The process exits when the caller
//! closes stdin; `kill_on_drop` on worker processes ties their lifetime to
//! the router's.

use futures::SinkExt;
use serde_json::Value;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{error, info, warn};

use hxmux_protocol::{ErrorCode, RouterCodec, RouterMessage};
use hxmux_utils::logging::{init_logging_with_config, LogConfig};

use hxmux_router::{Inbound, ProcessConnector, Router, RouterConfig};

#[tokio::main]
async fn main() {
    // Logging must not be fatal: a read-only log directory should not keep
    // the router from serving
    if let Err(e) = init_logging_with_config(LogConfig::router()) {
        eprintln!("hxmux-router: failed to initialize logging: {}", e);
    }

    let config = RouterConfig::load_default();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        timeout_ms = config.request_timeout_ms,
        "hxmux router starting"
    );

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RouterMessage>();
    let (in_tx, in_rx) = mpsc::channel::<Inbound>(config.inbound_capacity);

    let router = Router::new(&config, Box::new(ProcessConnector), out_tx.clone(), in_tx.clone());
    let router_task = tokio::spawn(router.run(in_rx));

    let writer_task = tokio::spawn(async move {
        let mut sink = FramedWrite::new(tokio::io::stdout(), RouterCodec::new());
        while let Some(msg) = out_rx.recv().await {
            if let Err(e) = sink.send(msg).await {
                error!("Write to caller failed: {}", e);
                break;
            }
        }
    });

    // Read caller frames line by line; a garbled line gets an error
    // envelope instead of ending the session
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => {
                        if in_tx.send(Inbound::Caller(value)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Undecodable caller frame: {}", e);
                        let _ = out_tx.send(RouterMessage::Error {
                            id: None,
                            code: ErrorCode::InvalidMessage,
                            message: format!("frame is not valid JSON: {}", e),
                        });
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!("Read from caller failed: {}", e);
                break;
            }
        }
    }

    info!("Caller stream closed; shutting down");
    router_task.abort();
    let _ = router_task.await;

    // The router's outbound sender is gone; let the writer drain what is
    // queued before the process exits
    drop(out_tx);
    let _ = writer_task.await;
}
