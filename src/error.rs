//! Error types for Formsense

use thiserror::Error;

/// Errors that can occur while setting up or driving a tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No form present on page")]
    NoForm,

    #[error("Unknown control: {0}")]
    UnknownControl(usize),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Script error: {0}")]
    ScriptError(String),
}

/// Failure reported by a transport: HTTP status plus a message.
///
/// Network failures are reported as `504 Connection timeout`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status} {message}")]
pub struct TransportError {
    pub status: u16,
    pub message: String,
}

impl TransportError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// The error reported when the collector could not be reached at all
    pub fn connection_timeout() -> Self {
        Self::new(504, "Connection timeout")
    }
}

/// A fingerprint probe could not produce its reading
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Probe failed: {0}")]
pub struct ProbeError(pub String);
