//! In-process transport over tokio channels.
//!
//! Envelopes are moved, never serialized, so transferred `Bytes` reach the
//! other side without a copy.

use std::sync::Mutex;
use std::sync::PoisonError;

use threadwire::Envelope;
use tokio::sync::mpsc;

use crate::transport;
use crate::transport::ClosedSend;
use crate::transport::Transport;

/// A duplex channel transport using tokio mpsc channels.
///
/// Messages sent via `send()` appear on the peer's `recv()` and vice versa.
pub struct MemoryTransport {
    tx: Mutex<Option<mpsc::UnboundedSender<Envelope>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Envelope>>,
    on_closed: ClosedSend,
}

impl MemoryTransport {
    /// Creates a pair of transports connected to each other.
    ///
    /// Messages sent on `a` are received by `b` and vice versa.
    pub fn pair() -> (Self, Self) {
        Self::pair_with(ClosedSend::default())
    }

    /// Like [`MemoryTransport::pair`], with an explicit policy for sends after close.
    pub fn pair_with(on_closed: ClosedSend) -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self {
            tx: Mutex::new(Some(tx_a)),
            rx: tokio::sync::Mutex::new(rx_b),
            on_closed,
        };

        let b = Self {
            tx: Mutex::new(Some(tx_b)),
            rx: tokio::sync::Mutex::new(rx_a),
            on_closed,
        };

        (a, b)
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Envelope>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, envelope: Envelope) -> transport::Result<()> {
        let Some(tx) = self.sender() else {
            return self.on_closed.apply();
        };
        match tx.send(envelope) {
            Ok(()) => Ok(()),
            // the peer dropped its receiver
            Err(_) => self.on_closed.apply(),
        }
    }

    async fn recv(&self) -> transport::Result<Option<Envelope>> {
        let mut rx = self.rx.lock().await;
        Ok(rx.recv().await)
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    fn supports_transfer(&self) -> bool {
        true
    }
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        self.close();
    }
}
