//! hxmux router: a message-passing broker between a caller-facing
//! dispatcher and a pool of long-lived background workers
//!
//! The router validates inbound requests, resolves path-prefix routes,
//! lazily starts worker sessions, and translates two incompatible worker
//! protocols (native enveloped request/response/event and a legacy
//! single-in-flight status/log protocol) into one request/response/event
//! contract. All mutable state is owned by a single dispatch loop task;
//! worker channels run concurrently but every inbound event is multiplexed
//! onto that one loop.

pub mod adapters;
pub mod config;
pub mod connector;
pub mod dispatch;
pub mod pending;
pub mod registry;
pub mod session;

pub use config::RouterConfig;
pub use connector::ProcessConnector;
pub use dispatch::{Inbound, Router};
pub use session::{WorkerConnector, WorkerEvent, WorkerEventTx, WorkerHandle};
