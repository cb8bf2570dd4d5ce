//! Error types for the redgate crate.

use thiserror::Error;

/// Errors that can occur while configuring, running or tearing down the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid port spec '{token}': {reason}")]
    InvalidPortSpec { token: String, reason: String },

    #[error("Port spec entry '{token}' uses {class} but no {class} proxy is configured")]
    MissingEndpoint { token: String, class: String },

    #[error("Malformed proxy URL: {0}")]
    MalformedUrl(String),

    #[error("Command '{command}' failed with {}: {output}", code.map(|c| format!("exit code {}", c)).unwrap_or_else(|| "no exit code".to_string()))]
    ExternalCommand { command: String, code: Option<i32>, output: String },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to signal relay process {pid}: {reason}")]
    SignalDelivery { pid: u32, reason: String },

    #[error("Relay process terminated: {0}")]
    UnexpectedTermination(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
