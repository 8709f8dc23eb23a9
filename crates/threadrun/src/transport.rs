//! # Transport Abstraction
//!
//! A minimal, async interface for moving messages between two contexts.
//!
//! ## Philosophy
//!
//! - **Message-Oriented**: A transport moves [`Envelope`]s. It never looks at
//!   call ids or function tables.
//! - **Ordered**: Envelopes arrive in the order they were sent. A transport
//!   may not reorder them.
//! - **Close is a message too**: `recv` returning `Ok(None)` is the close
//!   notification the endpoint waits for.

use std::fmt;

use threadwire::Envelope;

/// Errors that occur at the channel layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The channel was closed by either side.
    Closed,
    /// The peer is unreachable or the connection was dropped.
    ConnectionLost(String),
    /// Generic I/O error or internal transport failure.
    Io(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Channel closed"),
            Self::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for TransportError {}

pub type Result<T> = std::result::Result<T, TransportError>;

/// What `send` does once the channel is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ClosedSend {
    /// Fail with `TransportError::Closed`.
    #[default]
    Error,
    /// Drop the envelope and report success.
    Ignore,
}

impl ClosedSend {
    pub(crate) fn apply(self) -> Result<()> {
        match self {
            Self::Error => Err(TransportError::Closed),
            Self::Ignore => Ok(()),
        }
    }
}

/// A two-way, ordered message channel.
///
/// This trait is designed to be object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Sends an envelope to the other side.
    ///
    /// # invariants
    /// - Envelopes sent by one task arrive in the order they were sent.
    /// - After `close`, follows the transport's [`ClosedSend`] policy.
    async fn send(&self, envelope: Envelope) -> Result<()>;

    /// Receives the next envelope, or `Ok(None)` once the channel is closed.
    async fn recv(&self) -> Result<Option<Envelope>>;

    /// Closes this side of the channel. The other side's `recv` returns `Ok(None)`.
    fn close(&self);

    /// Whether `Envelope::transfer` buffers are moved natively.
    ///
    /// When false, the encoder copies binary data into the message instead.
    fn supports_transfer(&self) -> bool {
        false
    }
}
