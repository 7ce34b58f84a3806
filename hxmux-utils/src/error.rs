//! Error types for hxmux
//!
//! Provides a unified error type used across all hxmux crates.

use std::path::PathBuf;

/// Main error type for hxmux operations
#[derive(Debug, thiserror::Error)]
pub enum HxmuxError {
    // === IO Errors ===

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    // === Protocol Errors ===

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // === Configuration Errors ===

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    // === Routing Errors ===

    #[error("No route matches path: {0}")]
    RouteNotFound(String),

    #[error("Worker not defined: {0}")]
    WorkerNotFound(String),

    // === Worker Errors ===

    #[error("Worker not ready: {0}")]
    WorkerNotReady(String),

    #[error("Worker {worker} busy with request {active}")]
    WorkerBusy { worker: String, active: String },

    #[error("Worker failed: {0}")]
    WorkerFailed(String),

    #[error("Failed to spawn worker process: {0}")]
    SpawnFailed(String),

    #[error("Worker channel closed")]
    ChannelClosed,

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    // === Internal Errors ===

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HxmuxError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a worker-failed error
    pub fn worker_failed(msg: impl Into<String>) -> Self {
        Self::WorkerFailed(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if the caller may retry the operation that produced this error
    ///
    /// Worker warm-up, a busy legacy slot, and a timeout are all transient
    /// from the caller's point of view; everything else requires operator
    /// intervention or a corrected request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::WorkerNotReady(_) | Self::WorkerBusy { .. } | Self::Timeout { .. }
        )
    }
}

/// Result type alias using HxmuxError
pub type Result<T> = std::result::Result<T, HxmuxError>;

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Display Tests ====================

    #[test]
    fn test_error_display_route_not_found() {
        let err = HxmuxError::RouteNotFound("/hx/unknown".into());
        assert_eq!(err.to_string(), "No route matches path: /hx/unknown");
    }

    #[test]
    fn test_error_display_worker_not_found() {
        let err = HxmuxError::WorkerNotFound("liboqs".into());
        assert_eq!(err.to_string(), "Worker not defined: liboqs");
    }

    #[test]
    fn test_error_display_worker_busy() {
        let err = HxmuxError::WorkerBusy {
            worker: "liboqs".into(),
            active: "r1".into(),
        };
        assert_eq!(err.to_string(), "Worker liboqs busy with request r1");
    }

    #[test]
    fn test_error_display_timeout() {
        let err = HxmuxError::Timeout { ms: 30000 };
        assert_eq!(err.to_string(), "Request timed out after 30000ms");
    }

    #[test]
    fn test_error_display_channel_closed() {
        let err = HxmuxError::ChannelClosed;
        assert_eq!(err.to_string(), "Worker channel closed");
    }

    #[test]
    fn test_error_display_config_invalid() {
        let err = HxmuxError::ConfigInvalid {
            path: PathBuf::from("/home/user/.config/hxmux/config.toml"),
            message: "syntax error".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Invalid configuration"));
        assert!(msg.contains("config.toml"));
        assert!(msg.contains("syntax error"));
    }

    // ==================== Retryable Tests ====================

    #[test]
    fn test_retryable() {
        assert!(HxmuxError::WorkerNotReady("oqs".into()).is_retryable());
        assert!(HxmuxError::Timeout { ms: 5000 }.is_retryable());
        assert!(HxmuxError::WorkerBusy {
            worker: "w".into(),
            active: "r1".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_not_retryable_errors() {
        let non_retryable = [
            HxmuxError::RouteNotFound("/x".into()),
            HxmuxError::WorkerNotFound("x".into()),
            HxmuxError::WorkerFailed("crashed".into()),
            HxmuxError::Protocol("bad".into()),
            HxmuxError::InvalidMessage("bad".into()),
            HxmuxError::Config("bad".into()),
            HxmuxError::ChannelClosed,
            HxmuxError::SpawnFailed("enoent".into()),
            HxmuxError::Internal("bug".into()),
        ];

        for err in non_retryable {
            assert!(!err.is_retryable(), "Expected {:?} to NOT be retryable", err);
        }
    }

    // ==================== From Trait Tests ====================

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err: HxmuxError = io_err.into();
        assert!(matches!(err, HxmuxError::Io(_)));
    }

    // ==================== Helper Function Tests ====================

    #[test]
    fn test_protocol_helper() {
        let err = HxmuxError::protocol("unexpected frame");
        assert!(matches!(err, HxmuxError::Protocol(_)));
        assert_eq!(err.to_string(), "Protocol error: unexpected frame");
    }

    #[test]
    fn test_config_helper() {
        let err = HxmuxError::config("missing required field 'url'");
        assert!(matches!(err, HxmuxError::Config(_)));
        assert!(err.to_string().contains("missing required field"));
    }

    #[test]
    fn test_worker_failed_helper() {
        let err = HxmuxError::worker_failed("channel closed");
        assert!(matches!(err, HxmuxError::WorkerFailed(_)));
        assert_eq!(err.to_string(), "Worker failed: channel closed");
    }

    #[test]
    fn test_internal_helper() {
        let err = HxmuxError::internal("invariant violated");
        assert!(matches!(err, HxmuxError::Internal(_)));
        assert_eq!(err.to_string(), "Internal error: invariant violated");
    }
}
