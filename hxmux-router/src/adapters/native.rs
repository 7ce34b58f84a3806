//! Native protocol adapter
//!
//! Native workers speak the router's own enveloped request/response/event
//! contract with full request multiplexing. Each forwarded request gets a
//! pending entry and a timeout timer; the worker's tagged response resolves
//! it. Responses for unknown ids are orphans, reported once and ignored.

use serde_json::json;
use tracing::{debug, warn};

use hxmux_protocol::{ErrorCode, NativeCommand, RequestPayload, WorkerCommand, WorkerMessage};

use crate::pending::arm_timeout;
use crate::session::{WorkerEvent, WorkerSession};

use super::{AdapterCtx, ProtocolAdapter};

pub struct NativeAdapter;

impl ProtocolAdapter for NativeAdapter {
    fn dispatch(
        &self,
        ctx: &mut AdapterCtx<'_>,
        session: &mut WorkerSession,
        id: &str,
        _prefix: &str,
        request: RequestPayload,
    ) {
        if session.is_failed() {
            ctx.outbound.respond(
                id,
                502,
                json!({
                    "error": format!("worker '{}' has failed", session.name())
                }),
            );
            return;
        }

        if !session.is_ready() {
            // No pending entry: the caller is expected to retry
            ctx.outbound.respond(
                id,
                503,
                json!({
                    "error": format!("worker '{}' is still warming up", session.name())
                }),
            );
            return;
        }

        let command = WorkerCommand::Native(NativeCommand::Request {
            id: id.to_string(),
            request,
        });

        if let Err(e) = session.send(command) {
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

        let timer = arm_timeout(ctx.inbound_tx.clone(), id.to_string(), ctx.timeout);
        ctx.pending.insert(id, session.name(), timer);
        debug!(worker = %session.name(), request = %id, "Request forwarded to worker");
    }

    fn on_worker_event(
        &self,
        ctx: &mut AdapterCtx<'_>,
        session: &mut WorkerSession,
        event: WorkerEvent,
    ) {
        match event {
            WorkerEvent::Native(WorkerMessage::Ready) => {
                session.mark_ready();
            }

            WorkerEvent::Native(WorkerMessage::Response { id, response }) => {
                if id.is_empty() {
                    ctx.outbound.error(
                        None,
                        ErrorCode::InvalidMessage,
                        format!("worker '{}' sent a response without an id", session.name()),
                    );
                    return;
                }

                // The response must match a pending entry owned by this
                // worker; anything else is an orphan (already resolved,
                // timed out, or never issued).
                if ctx.pending.owner(&id) != Some(session.name()) {
                    ctx.outbound.error(
                        Some(id.clone()),
                        ErrorCode::OrphanResponse,
                        format!(
                            "no pending request '{}' for worker '{}'",
                            id,
                            session.name()
                        ),
                    );
                    return;
                }

                ctx.pending.resolve(&id);
                ctx.outbound.send_response(
                    id,
                    response.status_or_default(),
                    response.headers,
                    response.body,
                );
            }

            WorkerEvent::Native(WorkerMessage::Event { id, event, data }) => {
                if ctx.pending.owner(&id) == Some(session.name()) {
                    ctx.outbound.event(id, event, data);
                } else {
                    debug!(
                        worker = %session.name(),
                        request = %id,
                        "Ignoring event for unknown request id"
                    );
                }
            }

            WorkerEvent::Legacy(msg) => {
                warn!(
                    worker = %session.name(),
                    "Ignoring legacy envelope from native worker: {:?}",
                    msg
                );
            }

            // Handled by the dispatcher before delegation
            WorkerEvent::Closed { .. } => {}
        }
    }
}
