//! # Errors
//!
//! What a caller sees when a call does not resolve to a value.
//!
//! Failures that happened on the other side arrive as [`RemoteError`]s and
//! are sorted by their name. Failures of the channel itself (`Closed`,
//! `Transport`) are separate variants so callers can decide whether to retry.

use threadwire::ErrorShape;
use threadwire::names;

use crate::codec::DecodeError;
use crate::codec::EncodeError;
use crate::transport::TransportError;

/// A failure raised by a remote (or local) function, in serializable form.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{name}: {message}")]
pub struct RemoteError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
}

impl RemoteError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// A generic error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(names::GENERIC, message)
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn into_shape(self) -> ErrorShape {
        ErrorShape {
            name: self.name,
            message: self.message,
            stack: self.stack,
        }
    }
}

impl From<ErrorShape> for RemoteError {
    fn from(shape: ErrorShape) -> Self {
        Self {
            name: shape.name,
            message: shape.message,
            stack: shape.stack,
        }
    }
}

impl From<anyhow::Error> for RemoteError {
    fn from(e: anyhow::Error) -> Self {
        Self::msg(format!("{:#}", e)).with_stack(format!("{:?}", e))
    }
}

/// Lets a forwarding function report a failed hop as its own failure.
impl From<Error> for RemoteError {
    fn from(e: Error) -> Self {
        match e {
            Error::Remote(remote) | Error::MethodNotFound(remote) | Error::StaleFunction(remote) => remote,
            other => Self::msg(other.to_string()),
        }
    }
}

/// Errors surfaced to callers of an endpoint, thread or function.
#[derive(Clone, Debug, thiserror::Error)]
pub enum Error {
    /// The remote function ran and failed.
    #[error("remote error: {0}")]
    Remote(RemoteError),
    /// The call path did not resolve against the remote exposed object.
    #[error("method not found: {}", .0.message)]
    MethodNotFound(RemoteError),
    /// The function reference was released before it was called.
    #[error("stale function reference: {}", .0.message)]
    StaleFunction(RemoteError),
    /// The channel closed before the call settled, or was already closed.
    #[error("connection closed")]
    Closed,
    /// The caller's cancellation signal fired first.
    #[error("call canceled")]
    Canceled,
    /// The endpoint's call timeout expired.
    #[error("call timed out")]
    Timeout,
    /// The thread's shape has no member at this path.
    #[error("'{0}' is not part of the thread's shape")]
    Undefined(String),
    /// An argument could not be encoded; nothing was sent.
    #[error("encoding failed: {0}")]
    Encode(#[from] EncodeError),
    /// A response could not be decoded.
    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),
    /// The endpoint already exposes an object.
    #[error("endpoint already exposes an object")]
    AlreadyExposed,
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A worker thread could not be started.
    #[error("failed to spawn worker: {0}")]
    Spawn(String),
}

impl Error {
    /// True when the failure comes from the channel rather than the remote code.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::Transport(_))
    }

    /// Sorts an incoming error shape by its well-known name.
    pub(crate) fn from_shape(shape: ErrorShape) -> Self {
        let remote = RemoteError::from(shape);
        match remote.name.as_str() {
            names::METHOD_NOT_FOUND => Self::MethodNotFound(remote),
            names::STALE_FUNCTION => Self::StaleFunction(remote),
            _ => Self::Remote(remote),
        }
    }
}

/// A specialized Result type for endpoint operations.
pub type Result<T> = std::result::Result<T, Error>;
