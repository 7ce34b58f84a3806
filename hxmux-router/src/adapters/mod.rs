//! Protocol adapters
//!
//! Two incompatible worker protocols are unified behind one trait: the
//! dispatcher selects an adapter from the session's protocol mode and
//! never depends on the variant. Adapters are stateless strategies; the
//! mutable tables they operate on are owned by the dispatch loop and
//! lent out per call.

mod legacy;
mod native;

pub use legacy::LegacyAdapter;
pub use native::NativeAdapter;

use std::time::Duration;

use tokio::sync::mpsc;

use hxmux_protocol::{ProtocolMode, RequestPayload};

use crate::dispatch::{Inbound, Outbound};
use crate::pending::{LegacySlots, PendingTable};
use crate::session::{WorkerEvent, WorkerSession};

/// Mutable dispatcher state lent to an adapter for one call
pub struct AdapterCtx<'a> {
    pub pending: &'a mut PendingTable,
    pub slots: &'a mut LegacySlots,
    pub outbound: &'a Outbound,
    pub inbound_tx: &'a mpsc::Sender<Inbound>,
    pub timeout: Duration,
}

/// Common outward contract over the native and legacy worker protocols
pub trait ProtocolAdapter {
    /// Forward a validated, routed request to the worker session
    ///
    /// `prefix` is the matched route prefix (the legacy adapter uses it to
    /// recognize its single well-known operation path).
    fn dispatch(
        &self,
        ctx: &mut AdapterCtx<'_>,
        session: &mut WorkerSession,
        id: &str,
        prefix: &str,
        request: RequestPayload,
    );

    /// Translate one inbound worker envelope into caller-facing traffic
    ///
    /// Channel closure is handled by the dispatcher before delegation, so
    /// adapters never see [`WorkerEvent::Closed`].
    fn on_worker_event(
        &self,
        ctx: &mut AdapterCtx<'_>,
        session: &mut WorkerSession,
        event: WorkerEvent,
    );
}

static NATIVE: NativeAdapter = NativeAdapter;
static LEGACY: LegacyAdapter = LegacyAdapter;

/// Select the adapter for a session's protocol mode
pub fn adapter_for(mode: ProtocolMode) -> &'static dyn ProtocolAdapter {
    match mode {
        ProtocolMode::Native => &NATIVE,
        ProtocolMode::Legacy => &LEGACY,
    }
}
