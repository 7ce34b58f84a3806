//! Pending request tracking and legacy slot bookkeeping
//!
//! Every native in-flight request owns a timer task; the timer is aborted
//! the moment the paired response (or worker failure) resolves the entry,
//! so pending timers never leak.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::dispatch::Inbound;

/// One in-flight native request
#[derive(Debug)]
pub struct PendingRequest {
    /// Worker name handling the request
    pub worker: String,
    timer: JoinHandle<()>,
}

/// In-flight native requests keyed by caller-supplied request id
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight request with its armed timeout timer
    pub fn insert(&mut self, id: impl Into<String>, worker: impl Into<String>, timer: JoinHandle<()>) {
        self.entries.insert(
            id.into(),
            PendingRequest {
                worker: worker.into(),
                timer,
            },
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Worker name owning an in-flight request id
    pub fn owner(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|p| p.worker.as_str())
    }

    /// Resolve an entry, cancelling its timer
    ///
    /// Returns `None` when the id is unknown (already resolved, timed out,
    /// or never issued) — the orphan case.
    pub fn resolve(&mut self, id: &str) -> Option<PendingRequest> {
        let entry = self.entries.remove(id)?;
        entry.timer.abort();
        Some(entry)
    }

    /// Remove and resolve every entry owned by a failed worker,
    /// returning the affected request ids
    pub fn fail_worker(&mut self, worker: &str) -> Vec<String> {
        let ids: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, p)| p.worker == worker)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &ids {
            if let Some(entry) = self.entries.remove(id) {
                entry.timer.abort();
            }
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Arm a timeout timer for a request id
///
/// The timer posts back into the dispatch loop rather than resolving the
/// request directly; the loop ignores the message if the entry has already
/// been resolved (the abort racing a just-fired timer is harmless).
pub fn arm_timeout(tx: mpsc::Sender<Inbound>, id: String, timeout: Duration) -> JoinHandle<()> {
    // The deadline is anchored when the timer is armed, not when the spawned
    // task is first polled, so paused-time tests can advance past it reliably.
    let sleep = tokio::time::sleep(timeout);
    tokio::spawn(async move {
        sleep.await;
        let _ = tx.send(Inbound::RequestTimeout { id }).await;
    })
}

/// At most one active request per legacy worker: the legacy protocol has
/// no request multiplexing
#[derive(Debug, Default)]
pub struct LegacySlots {
    slots: HashMap<String, String>,
}

impl LegacySlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request id currently bound to a worker, if any
    pub fn active(&self, worker: &str) -> Option<&str> {
        self.slots.get(worker).map(String::as_str)
    }

    /// Bind a worker's slot to a request id
    pub fn bind(&mut self, worker: impl Into<String>, id: impl Into<String>) {
        self.slots.insert(worker.into(), id.into());
    }

    /// Clear a worker's slot, returning the request id that was bound
    pub fn clear(&mut self, worker: &str) -> Option<String> {
        self.slots.remove(worker)
    }
}
