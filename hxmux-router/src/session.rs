//! Worker session lifecycle
//!
//! One session per worker name, created lazily on the first routed request
//! and kept for the lifetime of the router process. A crashed worker leaves
//! its session in place, marked failed, so later requests observe the
//! failure instead of silently recreating the session (unless the
//! `recreate_failed_sessions` config flag opts in).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use hxmux_protocol::{LegacyMessage, ProtocolMode, WorkerCommand, WorkerMessage};
use hxmux_utils::{HxmuxError, Result};

use crate::dispatch::Inbound;
use crate::registry::WorkerDefinition;

/// Unified inbound traffic from a worker, regardless of protocol mode
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// An envelope from a native-mode worker
    Native(WorkerMessage),
    /// An envelope from a legacy-mode worker
    Legacy(LegacyMessage),
    /// The worker channel closed or failed
    Closed { reason: String },
}

/// Handle returned by a connector: the command channel into one worker
#[derive(Debug)]
pub struct WorkerHandle {
    pub commands: mpsc::UnboundedSender<WorkerCommand>,
}

/// Clonable sender a connector uses to push worker traffic into the
/// dispatch loop, tagged with the owning worker name
#[derive(Debug, Clone)]
pub struct WorkerEventTx {
    worker: String,
    tx: mpsc::Sender<Inbound>,
}

impl WorkerEventTx {
    pub fn new(worker: impl Into<String>, tx: mpsc::Sender<Inbound>) -> Self {
        Self {
            worker: worker.into(),
            tx,
        }
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Deliver one worker event to the dispatch loop
    ///
    /// A closed loop means the router is shutting down; the event is
    /// dropped silently.
    pub async fn send(&self, event: WorkerEvent) {
        let _ = self
            .tx
            .send(Inbound::Worker {
                worker: self.worker.clone(),
                event,
            })
            .await;
    }
}

/// Opens channels to worker endpoints
///
/// The dispatcher depends only on this trait; the process-spawning
/// implementation lives in [`crate::connector`], and tests substitute a
/// channel-backed mock.
pub trait WorkerConnector: Send {
    fn connect(&self, def: &WorkerDefinition, events: WorkerEventTx) -> Result<WorkerHandle>;
}

/// A live connection to one named worker
#[derive(Debug)]
pub struct WorkerSession {
    id: Uuid,
    name: String,
    mode: ProtocolMode,
    ready: bool,
    failed: bool,
    created_at: DateTime<Utc>,
    commands: mpsc::UnboundedSender<WorkerCommand>,
}

impl WorkerSession {
    /// Create a session from a freshly-connected handle
    ///
    /// Legacy sessions are ready immediately (the legacy protocol has no
    /// handshake); native sessions stay not-ready until `worker.ready`.
    pub fn new(name: impl Into<String>, mode: ProtocolMode, handle: WorkerHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mode,
            ready: mode == ProtocolMode::Legacy,
            failed: false,
            created_at: Utc::now(),
            commands: handle.commands,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    pub fn is_ready(&self) -> bool {
        self.ready && !self.failed
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Flip readiness on receipt of the worker's ready signal
    pub fn mark_ready(&mut self) {
        debug!(worker = %self.name, session = %self.id, "Worker session ready");
        self.ready = true;
    }

    /// Record a channel failure; the session stays in the map
    pub fn mark_failed(&mut self) {
        let age = Utc::now() - self.created_at;
        warn!(
            worker = %self.name,
            session = %self.id,
            age_secs = age.num_seconds(),
            "Worker session failed"
        );
        self.failed = true;
        self.ready = false;
    }

    /// Fire-and-forget send to the worker channel
    pub fn send(&self, command: WorkerCommand) -> Result<()> {
        if self.failed {
            return Err(HxmuxError::WorkerFailed(self.name.clone()));
        }
        self.commands
            .send(command)
            .map_err(|_| HxmuxError::ChannelClosed)
    }
}

/// Sessions keyed by worker name, at most one per name
#[derive(Debug, Default)]
pub struct SessionMap {
    sessions: HashMap<String, WorkerSession>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&WorkerSession> {
        self.sessions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut WorkerSession> {
        self.sessions.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sessions.contains_key(name)
    }

    pub fn insert(&mut self, session: WorkerSession) {
        self.sessions.insert(session.name().to_string(), session);
    }

    pub fn remove(&mut self, name: &str) -> Option<WorkerSession> {
        self.sessions.remove(name)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
