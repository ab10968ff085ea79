//! Engine configuration types for chainflow.
//!
//! `EngineConfig` represents an optional `engine.toml` controlling default
//! deadlines and logging. All fields have sensible defaults, and an empty
//! file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Workflow-wide deadline applied when the terminal node sets no
    /// `expire()`. Unset means no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_expiration_ms: Option<u64>,

    /// Upper bound for event-wait nodes that set no explicit timeout.
    /// Unset means event waits are unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_wait_timeout_ms: Option<u64>,

    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging settings consumed by the tracing setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,

    /// Bridge spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub otel: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
            otel: false,
        }
    }
}
