//! The dispatch loop
//!
//! One task owns every piece of mutable router state (route table,
//! registry, sessions, pending table, legacy slots) and processes inbound
//! messages strictly one at a time, in arrival order. Caller frames,
//! worker events, and timer expiries are all multiplexed onto the same
//! channel; sends to workers and to the caller boundary are
//! fire-and-forget, so the loop never blocks.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use hxmux_protocol::{
    parse_caller, CallerMessage, CallerParseError, ErrorCode, NativeCommand, ProtocolMode,
    RequestPayload, RouterMessage, WorkerCommand,
};
use hxmux_utils::{HxmuxError, Result};

use crate::adapters::{adapter_for, AdapterCtx};
use crate::config::RouterConfig;
use crate::pending::{LegacySlots, PendingTable};
use crate::registry::{RouteTable, WorkerDefinition, WorkerRegistry};
use crate::session::{SessionMap, WorkerConnector, WorkerEvent, WorkerEventTx, WorkerSession};

/// Everything the dispatch loop can receive
#[derive(Debug)]
pub enum Inbound {
    /// A raw frame from the caller boundary
    Caller(Value),
    /// Traffic from one worker channel
    Worker { worker: String, event: WorkerEvent },
    /// A request timeout timer fired
    RequestTimeout { id: String },
}

/// Fire-and-forget sender toward the caller boundary
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::UnboundedSender<RouterMessage>,
}

impl Outbound {
    pub fn new(tx: mpsc::UnboundedSender<RouterMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, msg: RouterMessage) {
        if self.tx.send(msg).is_err() {
            warn!("Caller boundary closed; dropping outbound message");
        }
    }

    /// Emit a terminal response with no headers
    pub fn respond(&self, id: impl Into<String>, status: u16, body: Value) {
        self.send_response(id, status, Value::Null, body);
    }

    /// Emit a terminal response
    pub fn send_response(
        &self,
        id: impl Into<String>,
        status: u16,
        headers: Value,
        body: Value,
    ) {
        self.send(RouterMessage::HxResponse {
            id: id.into(),
            status,
            headers,
            body,
        });
    }

    /// Emit an intermediate event correlated to a request id
    pub fn event(&self, id: impl Into<String>, event: impl Into<String>, data: Value) {
        self.send(RouterMessage::Event {
            id: id.into(),
            event: event.into(),
            data,
        });
    }

    /// Emit an out-of-band protocol error
    pub fn error(&self, id: Option<String>, code: ErrorCode, message: impl Into<String>) {
        self.send(RouterMessage::Error {
            id,
            code,
            message: message.into(),
        });
    }
}

/// The router: owns all mutable state, driven by [`Router::run`]
pub struct Router {
    routes: RouteTable,
    registry: WorkerRegistry,
    sessions: SessionMap,
    pending: PendingTable,
    slots: LegacySlots,
    outbound: Outbound,
    inbound_tx: mpsc::Sender<Inbound>,
    connector: Box<dyn WorkerConnector>,
    timeout: Duration,
    default_timeout_ms: u64,
    recreate_failed: bool,
}

impl Router {
    pub fn new(
        config: &RouterConfig,
        connector: Box<dyn WorkerConnector>,
        outbound: mpsc::UnboundedSender<RouterMessage>,
        inbound_tx: mpsc::Sender<Inbound>,
    ) -> Self {
        Self {
            routes: RouteTable::default(),
            registry: WorkerRegistry::default(),
            sessions: SessionMap::new(),
            pending: PendingTable::new(),
            slots: LegacySlots::new(),
            outbound: Outbound::new(outbound),
            inbound_tx,
            connector,
            timeout: Duration::from_millis(config.request_timeout_ms),
            default_timeout_ms: config.request_timeout_ms,
            recreate_failed: config.recreate_failed_sessions,
        }
    }

    /// Run the dispatch loop until every inbound sender is gone
    pub async fn run(mut self, mut inbound: mpsc::Receiver<Inbound>) {
        info!("Router dispatch loop started");
        while let Some(msg) = inbound.recv().await {
            self.handle(msg);
        }
        info!("Router dispatch loop stopped");
    }

    /// Process one inbound message
    pub fn handle(&mut self, msg: Inbound) {
        match msg {
            Inbound::Caller(value) => self.handle_caller(value),
            Inbound::Worker { worker, event } => self.handle_worker_event(&worker, event),
            Inbound::RequestTimeout { id } => self.handle_timeout(&id),
        }
    }

    // ==================== Caller traffic ====================

    fn handle_caller(&mut self, value: Value) {
        match parse_caller(&value) {
            Ok(CallerMessage::ControlInit {
                routes,
                workers,
                request_timeout_ms,
            }) => self.handle_init(routes, workers, request_timeout_ms),

            Ok(CallerMessage::ControlPing { id }) => {
                self.outbound.send(RouterMessage::ControlPong { id });
            }

            Ok(CallerMessage::HxRequest {
                id,
                method,
                path,
                headers,
                query,
                form,
                body,
            }) => self.handle_request(id, method, path, headers, query, form, body),

            Err(e) => {
                // Request-scoped when the frame carries a usable id
                let id = value
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(String::from);
                let code = match &e {
                    CallerParseError::UnknownKind(_) => ErrorCode::UnknownKind,
                    _ => ErrorCode::InvalidMessage,
                };
                warn!("Rejected inbound frame: {}", e);
                self.outbound.error(id, code, e.to_string());
            }
        }
    }

    /// Replace routes and worker definitions wholesale
    ///
    /// Live sessions are intentionally left running: in-flight requests
    /// keep their pending entries, and workers dropped from the new
    /// configuration simply become unroutable.
    fn handle_init(
        &mut self,
        routes: Vec<Value>,
        workers: HashMap<String, Value>,
        request_timeout_ms: Option<u64>,
    ) {
        self.routes = RouteTable::new(routes);
        self.registry = WorkerRegistry::new(workers);

        let ms = request_timeout_ms.unwrap_or(self.default_timeout_ms);
        self.timeout = Duration::from_millis(ms);

        info!(
            routes = self.routes.len(),
            workers = self.registry.len(),
            timeout_ms = ms,
            "Router initialized"
        );

        self.outbound.send(RouterMessage::ControlReady {
            routes: self.routes.len(),
            worker_count: self.registry.len(),
            request_timeout_ms: ms,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_request(
        &mut self,
        id: Value,
        method: Option<String>,
        path: Option<String>,
        headers: Value,
        query: Value,
        form: Value,
        body: Value,
    ) {
        let Some(id) = id
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from)
        else {
            // No id means no response can be addressed
            self.outbound.error(
                None,
                ErrorCode::MissingRequestId,
                "hx.request requires a non-empty string id",
            );
            return;
        };

        // One malformed request must never take the router down: anything
        // unexpected below becomes a 500 addressed to this id.
        if let Err(e) = self.dispatch_request(&id, method, path, headers, query, form, body) {
            error!(request = %id, "Dispatch failed: {}", e);
            self.outbound
                .respond(id, 500, json!({ "error": e.to_string() }));
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch_request(
        &mut self,
        id: &str,
        method: Option<String>,
        path: Option<String>,
        headers: Value,
        query: Value,
        form: Value,
        body: Value,
    ) -> Result<()> {
        if self.pending.contains(id) {
            self.outbound.error(
                Some(id.to_string()),
                ErrorCode::DuplicateRequestId,
                format!("request '{}' is already in flight", id),
            );
            return Ok(());
        }

        let Some(path) = path.filter(|p| !p.is_empty()) else {
            self.outbound
                .respond(id, 400, Value::String("Missing request path".into()));
            return Ok(());
        };

        let Some(binding) = self.routes.match_route(&path) else {
            self.outbound.respond(
                id,
                404,
                Value::String(format!("No route matches path: {}", escape_html(&path))),
            );
            return Ok(());
        };
        let prefix = binding.prefix.clone();
        let worker = binding.worker.clone();

        // Routes and definitions register together, so a miss here is a
        // configuration bug, not a runtime fault
        let Some(def) = self.registry.get(&worker) else {
            error!(worker = %worker, "Route points at undefined worker");
            self.outbound.respond(
                id,
                500,
                json!({ "error": format!("route points at undefined worker '{}'", worker) }),
            );
            return Ok(());
        };
        let def = def.clone();

        if let Err(e) = self.ensure_session(&def) {
            warn!(worker = %worker, "Failed to open worker session: {}", e);
            self.outbound.respond(
                id,
                502,
                json!({ "error": format!("worker '{}' unavailable: {}", worker, e) }),
            );
            return Ok(());
        }

        let method = method
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| m.to_ascii_uppercase())
            .unwrap_or_else(|| "GET".to_string());

        let request = RequestPayload {
            method,
            path,
            headers,
            query,
            form,
            body,
        };

        let session = self
            .sessions
            .get_mut(&worker)
            .ok_or_else(|| HxmuxError::internal(format!("session '{}' missing after ensure", worker)))?;

        let mut ctx = AdapterCtx {
            pending: &mut self.pending,
            slots: &mut self.slots,
            outbound: &self.outbound,
            inbound_tx: &self.inbound_tx,
            timeout: self.timeout,
        };
        adapter_for(session.mode()).dispatch(&mut ctx, session, id, &prefix, request);
        Ok(())
    }

    /// Return once a session for the worker exists in the map
    ///
    /// A failed session is reused as-is (so callers observe the failure)
    /// unless `recreate_failed_sessions` is set.
    fn ensure_session(&mut self, def: &WorkerDefinition) -> Result<()> {
        if let Some(existing) = self.sessions.get(&def.name) {
            if existing.is_failed() && self.recreate_failed {
                info!(worker = %def.name, "Recreating failed worker session");
                self.sessions.remove(&def.name);
            } else {
                return Ok(());
            }
        }

        let events = WorkerEventTx::new(def.name.clone(), self.inbound_tx.clone());
        let handle = self.connector.connect(def, events)?;
        let session = WorkerSession::new(def.name.clone(), def.mode, handle);
        info!(
            worker = %def.name,
            mode = ?def.mode,
            session = %session.id(),
            "Worker session created"
        );

        if def.mode == ProtocolMode::Native {
            // A closed channel here surfaces when the request itself is sent
            let _ = session.send(WorkerCommand::Native(NativeCommand::Init {
                worker: def.name.clone(),
                config: def.config.clone(),
            }));
        }

        self.sessions.insert(session);
        Ok(())
    }

    // ==================== Worker traffic ====================

    fn handle_worker_event(&mut self, worker: &str, event: WorkerEvent) {
        if !self.sessions.contains(worker) {
            warn!(worker = %worker, "Event from unknown worker session");
            return;
        }

        match event {
            WorkerEvent::Closed { reason } => self.handle_worker_closed(worker, &reason),
            event => {
                let Some(session) = self.sessions.get_mut(worker) else {
                    return;
                };
                let mut ctx = AdapterCtx {
                    pending: &mut self.pending,
                    slots: &mut self.slots,
                    outbound: &self.outbound,
                    inbound_tx: &self.inbound_tx,
                    timeout: self.timeout,
                };
                adapter_for(session.mode()).on_worker_event(&mut ctx, session, event);
            }
        }
    }

    /// A worker channel failed: fail its pending requests, clear its legacy
    /// slot, and leave the session in place marked failed
    fn handle_worker_closed(&mut self, worker: &str, reason: &str) {
        warn!(worker = %worker, "Worker channel closed: {}", reason);

        for id in self.pending.fail_worker(worker) {
            self.outbound.respond(
                id,
                502,
                json!({ "error": format!("worker '{}' failed: {}", worker, reason) }),
            );
        }

        if let Some(bound) = self.slots.clear(worker) {
            self.outbound.event(
                bound,
                "status",
                json!({
                    "state": "error",
                    "error": format!("worker '{}' failed: {}", worker, reason),
                }),
            );
        }

        if let Some(session) = self.sessions.get_mut(worker) {
            session.mark_failed();
        }

        // The session is retained: this worker's routes stay degraded
        // until re-init or recreation, never silently healed
        self.outbound.error(
            None,
            ErrorCode::WorkerFailed,
            format!("worker '{}' channel closed: {}", worker, reason),
        );
    }

    // ==================== Timers ====================

    fn handle_timeout(&mut self, id: &str) {
        let Some(entry) = self.pending.resolve(id) else {
            // Resolved just before the timer message was processed
            debug!(request = %id, "Ignoring stale timeout");
            return;
        };

        warn!(request = %id, worker = %entry.worker, "Request timed out");
        self.outbound.respond(
            id,
            504,
            json!({
                "error": format!("request timed out after {}ms", self.timeout.as_millis())
            }),
        );
    }
}

/// Minimal HTML escaping for paths echoed into response bodies
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}
