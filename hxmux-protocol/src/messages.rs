//! Caller-facing and worker-facing message types
//!
//! Payload fields (headers, query, form, body, event data, worker config)
//! are carried as opaque `serde_json::Value`s: the router correlates and
//! translates, it does not interpret request content.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default timeout for in-flight requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

// ==================== Caller -> Router ====================

/// Messages sent from the caller boundary to the router
///
/// Collection-valued `control.init` fields deserialize as raw JSON so that
/// individually malformed route/worker entries can be dropped at
/// registration time instead of failing the whole message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum CallerMessage {
    /// Configure routes and worker definitions (replaces any prior state)
    #[serde(rename = "control.init", rename_all = "camelCase")]
    ControlInit {
        #[serde(default)]
        routes: Vec<Value>,
        #[serde(default)]
        workers: HashMap<String, Value>,
        #[serde(default)]
        request_timeout_ms: Option<u64>,
    },

    /// Liveness check; the id is echoed back verbatim
    #[serde(rename = "control.ping")]
    ControlPing {
        #[serde(default)]
        id: Value,
    },

    /// A routed request; `id` must be a non-empty string chosen by the caller
    #[serde(rename = "hx.request")]
    HxRequest {
        #[serde(default)]
        id: Value,
        #[serde(default)]
        method: Option<String>,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        headers: Value,
        #[serde(default)]
        query: Value,
        #[serde(default)]
        form: Value,
        #[serde(default)]
        body: Value,
    },
}

/// Why an inbound caller frame could not be turned into a [`CallerMessage`]
#[derive(Debug, thiserror::Error)]
pub enum CallerParseError {
    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no 'kind' field")]
    MissingKind,

    #[error("unknown message kind: {0}")]
    UnknownKind(String),

    #[error("malformed {kind} message: {error}")]
    Malformed { kind: String, error: String },
}

/// Parse a raw inbound frame into a typed caller message
///
/// Unknown kinds and malformed shapes are reported as errors rather than
/// panicking or tearing down the connection; the router converts them into
/// `error` envelopes.
pub fn parse_caller(value: &Value) -> Result<CallerMessage, CallerParseError> {
    let obj = value.as_object().ok_or(CallerParseError::NotAnObject)?;
    let kind = obj
        .get("kind")
        .and_then(Value::as_str)
        .ok_or(CallerParseError::MissingKind)?;

    match kind {
        "control.init" | "control.ping" | "hx.request" => {
            serde_json::from_value(value.clone()).map_err(|e| CallerParseError::Malformed {
                kind: kind.to_string(),
                error: e.to_string(),
            })
        }
        other => Err(CallerParseError::UnknownKind(other.to_string())),
    }
}

// ==================== Router -> Caller ====================

/// Error codes carried in `error` envelopes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request lacked a non-empty string id; no response can be addressed
    MissingRequestId,
    /// A request with this id is already in flight
    DuplicateRequestId,
    /// Worker response named an id with no pending entry
    OrphanResponse,
    /// Inbound message kind is not recognized
    UnknownKind,
    /// Inbound message failed structural validation
    InvalidMessage,
    /// A worker channel failed or closed
    WorkerFailed,
    /// Unexpected router fault
    Internal,
}

/// Messages emitted by the router toward the caller boundary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum RouterMessage {
    /// Acknowledgment of `control.init`
    #[serde(rename = "control.ready", rename_all = "camelCase")]
    ControlReady {
        routes: usize,
        worker_count: usize,
        request_timeout_ms: u64,
    },

    /// Reply to `control.ping`
    #[serde(rename = "control.pong")]
    ControlPong { id: Value },

    /// The single terminal response for a request id
    #[serde(rename = "hx.response")]
    HxResponse {
        id: String,
        status: u16,
        headers: Value,
        body: Value,
    },

    /// An intermediate event correlated to a request id
    #[serde(rename = "event")]
    Event { id: String, event: String, data: Value },

    /// Out-of-band protocol error; `id` is null when the fault is not
    /// attributable to a specific request
    #[serde(rename = "error")]
    Error {
        id: Option<String>,
        code: ErrorCode,
        message: String,
    },
}

// ==================== Shared payloads ====================

/// Request payload forwarded to native workers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestPayload {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: Value,
    #[serde(default)]
    pub query: Value,
    #[serde(default)]
    pub form: Value,
    #[serde(default)]
    pub body: Value,
}

/// Response payload supplied by a native worker
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResponsePayload {
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub body: Value,
    #[serde(default)]
    pub headers: Value,
}

impl ResponsePayload {
    /// Worker-supplied status, or 500 when it is not a recognizable
    /// HTTP-like status code
    pub fn status_or_default(&self) -> u16 {
        self.status
            .as_u64()
            .and_then(|s| u16::try_from(s).ok())
            .filter(|s| (100..=599).contains(s))
            .unwrap_or(500)
    }
}

// ==================== Protocol mode ====================

/// Which worker-facing protocol a session speaks
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolMode {
    Native,
    Legacy,
}

impl ProtocolMode {
    /// Parse a worker definition's `mode` string
    ///
    /// Legacy workers declare variant-specific modes such as
    /// "legacy-liboqs"; anything starting with "legacy" selects the legacy
    /// adapter, everything else is treated as native.
    pub fn from_mode_str(mode: &str) -> Self {
        if mode.trim().to_ascii_lowercase().starts_with("legacy") {
            Self::Legacy
        } else {
            Self::Native
        }
    }
}

// ==================== Router -> Worker ====================

/// Envelopes sent to native-mode workers, tagged with `kind`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum NativeCommand {
    #[serde(rename = "worker.init")]
    Init { worker: String, config: Value },

    #[serde(rename = "worker.request")]
    Request { id: String, request: RequestPayload },
}

/// Envelopes sent to legacy-mode workers, tagged with `type`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LegacyCommand {
    #[serde(rename = "run")]
    Run,
}

/// Union of outbound worker envelopes
///
/// Untagged so serialization is exactly the inner envelope; the session
/// channel carries one command type regardless of protocol mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WorkerCommand {
    Native(NativeCommand),
    Legacy(LegacyCommand),
}

// ==================== Worker -> Router ====================

/// Envelopes received from native-mode workers, tagged with `kind`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind")]
pub enum WorkerMessage {
    #[serde(rename = "worker.ready")]
    Ready,

    #[serde(rename = "worker.response")]
    Response {
        #[serde(default)]
        id: String,
        #[serde(default)]
        response: ResponsePayload,
    },

    #[serde(rename = "worker.event")]
    Event {
        #[serde(default)]
        id: String,
        #[serde(default)]
        event: String,
        #[serde(default)]
        data: Value,
    },
}

/// Lifecycle states reported by legacy workers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LegacyState {
    Starting,
    Running,
    Busy,
    Done,
    Error,
}

impl LegacyState {
    /// Terminal states clear the worker's active slot
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Envelopes received from legacy-mode workers, tagged with `type`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum LegacyMessage {
    #[serde(rename = "log-batch")]
    LogBatch {
        #[serde(default)]
        entries: Vec<Value>,
    },

    #[serde(rename = "status")]
    Status {
        state: LegacyState,
        #[serde(default)]
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== Caller Message Tests ====================

    #[test]
    fn test_parse_control_init() {
        let value = json!({
            "kind": "control.init",
            "routes": [{"prefix": "/hx/tests/liboqs", "worker": "liboqs"}],
            "workers": {"liboqs": {"url": "./liboqs-worker", "mode": "legacy-liboqs"}},
            "requestTimeoutMs": 15000
        });

        let msg = parse_caller(&value).unwrap();
        match msg {
            CallerMessage::ControlInit {
                routes,
                workers,
                request_timeout_ms,
            } => {
                assert_eq!(routes.len(), 1);
                assert!(workers.contains_key("liboqs"));
                assert_eq!(request_timeout_ms, Some(15000));
            }
            other => panic!("expected ControlInit, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_control_init_defaults() {
        let msg = parse_caller(&json!({"kind": "control.init"})).unwrap();
        match msg {
            CallerMessage::ControlInit {
                routes,
                workers,
                request_timeout_ms,
            } => {
                assert!(routes.is_empty());
                assert!(workers.is_empty());
                assert_eq!(request_timeout_ms, None);
            }
            other => panic!("expected ControlInit, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_hx_request() {
        let value = json!({
            "kind": "hx.request",
            "id": "r1",
            "method": "post",
            "path": "/hx/tests/liboqs/run",
            "body": {"alg": "ML-KEM-768"}
        });

        let msg = parse_caller(&value).unwrap();
        match msg {
            CallerMessage::HxRequest {
                id, method, path, ..
            } => {
                assert_eq!(id, json!("r1"));
                assert_eq!(method.as_deref(), Some("post"));
                assert_eq!(path.as_deref(), Some("/hx/tests/liboqs/run"));
            }
            other => panic!("expected HxRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_hx_request_missing_id() {
        // Parse succeeds; the router rejects the empty id at dispatch time
        let msg = parse_caller(&json!({"kind": "hx.request", "path": "/x"})).unwrap();
        match msg {
            CallerMessage::HxRequest { id, .. } => assert!(id.is_null()),
            other => panic!("expected HxRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_kind() {
        let err = parse_caller(&json!({"kind": "hx.subscribe", "id": "r1"})).unwrap_err();
        assert!(matches!(err, CallerParseError::UnknownKind(k) if k == "hx.subscribe"));
    }

    #[test]
    fn test_parse_missing_kind() {
        let err = parse_caller(&json!({"id": "r1"})).unwrap_err();
        assert!(matches!(err, CallerParseError::MissingKind));
    }

    #[test]
    fn test_parse_not_an_object() {
        let err = parse_caller(&json!(["not", "an", "object"])).unwrap_err();
        assert!(matches!(err, CallerParseError::NotAnObject));
    }

    #[test]
    fn test_parse_malformed_known_kind() {
        // routes must be an array
        let err =
            parse_caller(&json!({"kind": "control.init", "routes": "nope"})).unwrap_err();
        assert!(matches!(err, CallerParseError::Malformed { kind, .. } if kind == "control.init"));
    }

    // ==================== Router Message Wire Shape Tests ====================

    #[test]
    fn test_control_ready_wire_shape() {
        let msg = RouterMessage::ControlReady {
            routes: 2,
            worker_count: 1,
            request_timeout_ms: 30000,
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "kind": "control.ready",
                "routes": 2,
                "workerCount": 1,
                "requestTimeoutMs": 30000
            })
        );
    }

    #[test]
    fn test_hx_response_wire_shape() {
        let msg = RouterMessage::HxResponse {
            id: "r1".into(),
            status: 404,
            headers: Value::Null,
            body: json!("no route"),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["kind"], "hx.response");
        assert_eq!(value["id"], "r1");
        assert_eq!(value["status"], 404);
    }

    #[test]
    fn test_error_envelope_null_id() {
        let msg = RouterMessage::Error {
            id: None,
            code: ErrorCode::UnknownKind,
            message: "unknown message kind".into(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["code"], "UNKNOWN_KIND");
    }

    #[test]
    fn test_error_code_wire_names() {
        let cases = [
            (ErrorCode::MissingRequestId, "MISSING_REQUEST_ID"),
            (ErrorCode::DuplicateRequestId, "DUPLICATE_REQUEST_ID"),
            (ErrorCode::OrphanResponse, "ORPHAN_RESPONSE"),
            (ErrorCode::UnknownKind, "UNKNOWN_KIND"),
            (ErrorCode::InvalidMessage, "INVALID_MESSAGE"),
            (ErrorCode::WorkerFailed, "WORKER_FAILED"),
            (ErrorCode::Internal, "INTERNAL"),
        ];
        for (code, name) in cases {
            assert_eq!(serde_json::to_value(code).unwrap(), json!(name));
        }
    }

    // ==================== Worker Envelope Tests ====================

    #[test]
    fn test_native_request_wire_shape() {
        let cmd = NativeCommand::Request {
            id: "r1".into(),
            request: RequestPayload {
                method: "GET".into(),
                path: "/hx/tests/blake3".into(),
                headers: Value::Null,
                query: Value::Null,
                form: Value::Null,
                body: Value::Null,
            },
        };
        let value = serde_json::to_value(&cmd).unwrap();
        assert_eq!(value["kind"], "worker.request");
        assert_eq!(value["request"]["method"], "GET");
    }

    #[test]
    fn test_worker_command_untagged_serialization() {
        let native = WorkerCommand::Native(NativeCommand::Init {
            worker: "blake3".into(),
            config: json!({}),
        });
        assert_eq!(serde_json::to_value(&native).unwrap()["kind"], "worker.init");

        let legacy = WorkerCommand::Legacy(LegacyCommand::Run);
        assert_eq!(serde_json::to_value(&legacy).unwrap(), json!({"type": "run"}));
    }

    #[test]
    fn test_worker_message_ready() {
        let msg: WorkerMessage = serde_json::from_value(json!({"kind": "worker.ready"})).unwrap();
        assert_eq!(msg, WorkerMessage::Ready);
    }

    #[test]
    fn test_worker_response_status_default() {
        let msg: WorkerMessage = serde_json::from_value(json!({
            "kind": "worker.response",
            "id": "r1",
            "response": {"body": "ok"}
        }))
        .unwrap();
        match msg {
            WorkerMessage::Response { response, .. } => {
                assert_eq!(response.status_or_default(), 500);
            }
            other => panic!("expected Response, got {:?}", other),
        }
    }

    #[test]
    fn test_worker_response_status_passthrough() {
        let payload: ResponsePayload =
            serde_json::from_value(json!({"status": 201, "body": {}})).unwrap();
        assert_eq!(payload.status_or_default(), 201);
    }

    #[test]
    fn test_worker_response_status_unrecognizable() {
        for status in [json!("ok"), json!(-1), json!(70000), json!(3.14), json!(42)] {
            let payload: ResponsePayload =
                serde_json::from_value(json!({ "status": status })).unwrap();
            assert_eq!(payload.status_or_default(), 500, "status {:?}", status);
        }
    }

    #[test]
    fn test_legacy_log_batch() {
        let msg: LegacyMessage = serde_json::from_value(json!({
            "type": "log-batch",
            "entries": [{"css": "info", "msg": "sig ok"}]
        }))
        .unwrap();
        match msg {
            LegacyMessage::LogBatch { entries } => assert_eq!(entries.len(), 1),
            other => panic!("expected LogBatch, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_status_states() {
        for (raw, terminal) in [
            ("starting", false),
            ("running", false),
            ("busy", false),
            ("done", true),
            ("error", true),
        ] {
            let msg: LegacyMessage =
                serde_json::from_value(json!({"type": "status", "state": raw})).unwrap();
            match msg {
                LegacyMessage::Status { state, .. } => {
                    assert_eq!(state.is_terminal(), terminal, "state {}", raw)
                }
                other => panic!("expected Status, got {:?}", other),
            }
        }
    }

    // ==================== Protocol Mode Tests ====================

    #[test]
    fn test_protocol_mode_parsing() {
        assert_eq!(ProtocolMode::from_mode_str("native"), ProtocolMode::Native);
        assert_eq!(ProtocolMode::from_mode_str("legacy"), ProtocolMode::Legacy);
        assert_eq!(
            ProtocolMode::from_mode_str("legacy-liboqs"),
            ProtocolMode::Legacy
        );
        assert_eq!(
            ProtocolMode::from_mode_str("LEGACY-LIBOQS"),
            ProtocolMode::Legacy
        );
        // Unknown modes are tolerated as native
        assert_eq!(ProtocolMode::from_mode_str("v2"), ProtocolMode::Native);
    }
}
