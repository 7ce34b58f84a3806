//! Legacy protocol adapter
//!
//! Legacy workers speak an older status/log protocol: no request
//! correlation, one run at a time, results delivered as events. The
//! adapter acknowledges acceptance with a 202 and translates the worker's
//! batched logs and terminal status into events tagged with the request id
//! bound to the worker's single active slot. Callers must treat the 202
//! plus the event stream as the full result; there is no second response.

use serde_json::{json, Value};
use tracing::{debug, warn};

use hxmux_protocol::{ErrorCode, LegacyCommand, LegacyMessage, RequestPayload, WorkerCommand};

use crate::dispatch::escape_html;
use crate::session::{WorkerEvent, WorkerSession};

use super::{AdapterCtx, ProtocolAdapter};

/// Path remainder (after the matched route prefix) naming the single
/// operation legacy workers support
const RUN_SUFFIX: &str = "/run";

pub struct LegacyAdapter;

impl ProtocolAdapter for LegacyAdapter {
    fn dispatch(
        &self,
        ctx: &mut AdapterCtx<'_>,
        session: &mut WorkerSession,
        id: &str,
        prefix: &str,
        request: RequestPayload,
    ) {
        if request.path.strip_prefix(prefix) != Some(RUN_SUFFIX) {
            ctx.outbound.respond(
                id,
                404,
                Value::String(format!(
                    "Unknown legacy operation: {}",
                    escape_html(&request.path)
                )),
            );
            return;
        }

        if let Some(active) = ctx.slots.active(session.name()) {
            if active == id {
                ctx.outbound.error(
                    Some(id.to_string()),
                    ErrorCode::DuplicateRequestId,
                    format!("request '{}' is already running on worker '{}'", id, session.name()),
                );
                return;
            }
            // Strict one-at-a-time: reject rather than queue
            ctx.outbound.respond(
                id,
                409,
                json!({
                    "error": format!("worker '{}' busy", session.name()),
                    "activeRequestId": active,
                }),
            );
            return;
        }

        if let Err(e) = session.send(WorkerCommand::Legacy(LegacyCommand::Run)) {
            warn!(worker = %session.name(), request = %id, "Send to worker failed: {}", e);
            session.mark_failed();
            ctx.outbound.respond(
                id,
                502,
                json!({
                    "error": format!("worker '{}' unavailable: {}", session.name(), e)
                }),
            );
            return;
        }

        ctx.slots.bind(session.name(), id);
        debug!(worker = %session.name(), request = %id, "Legacy run started");
        ctx.outbound.respond(
            id,
            202,
            json!({ "accepted": true, "worker": session.name() }),
        );
    }

    fn on_worker_event(
        &self,
        ctx: &mut AdapterCtx<'_>,
        session: &mut WorkerSession,
        event: WorkerEvent,
    ) {
        match event {
            WorkerEvent::Legacy(LegacyMessage::LogBatch { entries }) => {
                match ctx.slots.active(session.name()) {
                    Some(id) => {
                        ctx.outbound
                            .event(id.to_string(), "log-batch", Value::Array(entries));
                    }
                    None => {
                        debug!(worker = %session.name(), "Ignoring log batch with no active run");
                    }
                }
            }

            WorkerEvent::Legacy(LegacyMessage::Status { state, error }) => {
                if state.is_terminal() {
                    match ctx.slots.clear(session.name()) {
                        Some(id) => {
                            ctx.outbound.event(
                                id,
                                "status",
                                json!({ "state": state, "error": error }),
                            );
                        }
                        None => {
                            debug!(
                                worker = %session.name(),
                                "Ignoring terminal status with no active run"
                            );
                        }
                    }
                } else if let Some(id) = ctx.slots.active(session.name()) {
                    ctx.outbound
                        .event(id.to_string(), "status", json!({ "state": state }));
                }
            }

            WorkerEvent::Native(msg) => {
                warn!(
                    worker = %session.name(),
                    "Ignoring native envelope from legacy worker: {:?}",
                    msg
                );
            }

            // Handled by the dispatcher before delegation
            WorkerEvent::Closed { .. } => {}
        }
    }
}
