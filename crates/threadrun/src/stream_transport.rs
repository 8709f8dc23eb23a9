//! Newline-delimited JSON transport over any byte stream.
//!
//! Fits sockets, pipes and child-process stdio. Binary payloads are copied
//! into the message because a byte stream cannot move buffers.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use threadwire::Envelope;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::Mutex;
use tracing::warn;

use crate::transport;
use crate::transport::ClosedSend;
use crate::transport::Transport;
use crate::transport::TransportError;

type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One JSON message per line in each direction.
pub struct StreamTransport {
    reader: Mutex<BufReader<BoxReader>>,
    writer: Mutex<Option<BoxWriter>>,
    closed: AtomicBool,
    on_closed: ClosedSend,
}

impl StreamTransport {
    pub fn new(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self::with_policy(reader, writer, ClosedSend::default())
    }

    pub fn with_policy(
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        on_closed: ClosedSend,
    ) -> Self {
        let reader: BoxReader = Box::new(reader);
        let writer: BoxWriter = Box::new(writer);
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(Some(writer)),
            closed: AtomicBool::new(false),
            on_closed,
        }
    }
}

fn io_error(e: std::io::Error) -> TransportError {
    match e.kind() {
        std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted => TransportError::ConnectionLost(e.to_string()),
        _ => TransportError::Io(e.to_string()),
    }
}

#[async_trait::async_trait]
impl Transport for StreamTransport {
    async fn send(&self, envelope: Envelope) -> transport::Result<()> {
        if !envelope.transfer.is_empty() {
            return Err(TransportError::Io("byte streams cannot transfer buffers".into()));
        }

        let mut line = threadwire::encode_message(&envelope.message)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        line.push(b'\n');

        let mut guard = self.writer.lock().await;
        if self.closed.load(Ordering::Acquire) {
            guard.take();
        }
        let Some(writer) = guard.as_mut() else {
            return self.on_closed.apply();
        };

        writer.write_all(&line).await.map_err(io_error)?;
        writer.flush().await.map_err(io_error)?;
        if self.closed.load(Ordering::Acquire) {
            guard.take();
        }
        Ok(())
    }

    async fn recv(&self) -> transport::Result<Option<Envelope>> {
        let mut reader = self.reader.lock().await;
        let mut line = Vec::new();
        loop {
            line.clear();
            // raw bytes so a line that is not UTF-8 is skipped like any other bad line
            if reader.read_until(b'\n', &mut line).await.map_err(io_error)? == 0 {
                return Ok(None);
            }
            if line.trim_ascii().is_empty() {
                continue;
            }
            match threadwire::decode_message(&line) {
                Ok(message) => return Ok(Some(Envelope::new(message))),
                Err(e) => warn!(error = %e, "skipping malformed message"),
            }
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        // a send in flight holds the lock; it drops the writer when it sees the flag
        if let Ok(mut guard) = self.writer.try_lock() {
            guard.take();
        }
    }
}
