//! hxmux-protocol: Shared message definitions for router communication
//!
//! This crate defines all message types exchanged between callers, the
//! router, and workers, plus the NDJSON framing codec used at process
//! boundaries. Everything on the wire is a JSON object tagged with `kind`
//! (caller and native worker traffic) or `type` (legacy worker traffic).

pub mod codec;
pub mod messages;

// Re-export main types at crate root
pub use codec::{CallerCodec, CodecError, RouterCodec};
pub use messages::{
    parse_caller, CallerMessage, CallerParseError, ErrorCode, LegacyCommand, LegacyMessage,
    LegacyState, NativeCommand, ProtocolMode, RequestPayload, ResponsePayload, RouterMessage,
    WorkerCommand, WorkerMessage, DEFAULT_REQUEST_TIMEOUT_MS,
};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;
