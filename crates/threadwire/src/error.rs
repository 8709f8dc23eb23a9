//! # Error Definitions
//!
//! Failures while turning bytes into messages or checking their structure.

/// Wire-level failures.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The bytes were not a valid JSON message.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The message parsed but breaks a structural rule (e.g. an empty call path).
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// A `Transfer` value points past the end of the envelope's transfer list.
    #[error("transfer index {index} out of range ({len} buffers transferred)")]
    TransferOutOfRange { index: u32, len: usize },
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, WireError>;
