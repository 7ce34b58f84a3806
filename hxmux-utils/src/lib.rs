//! hxmux-utils: Common utilities shared across the hxmux crates
//!
//! Provides the unified error type, tracing-based logging setup, and
//! XDG-compliant path helpers.

pub mod error;
pub mod logging;
pub mod paths;

pub use error::{HxmuxError, Result};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
