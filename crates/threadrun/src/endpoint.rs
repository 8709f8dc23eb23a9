//! # Endpoint with Async Pump
//!
//! One side of a channel. An endpoint answers calls against its exposed
//! object and makes calls against the other side's.
//!
//! ## Architecture
//!
//! Each endpoint runs two tasks:
//!
//! - **Writer**: drains a single ordered outbox into the transport. Every
//!   outgoing message goes through it, so messages leave in the order they
//!   were produced.
//! - **Reader (pump)**: receives envelopes and routes them. Responses settle
//!   pending calls by id, whatever order they arrive in. Incoming calls run on
//!   their own tasks so a slow method never blocks the channel.
//!
//! Both tasks hold the transport and reach endpoint state only through a
//! `Weak` reference. The writer closes the endpoint when a send fails.
//! Dropping every [`Endpoint`] handle drains the outbox, closes the transport
//! and stops the pump.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::OnceLock;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashMap;
use threadwire::CallId;
use threadwire::Envelope;
use threadwire::ErrorShape;
use threadwire::FunctionId;
use threadwire::Message;
use threadwire::WireValue;
use threadwire::names;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tokio::time::Sleep;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::builder::EndpointBuilder;
use crate::codec::Decoder;
use crate::codec::Encoder;
use crate::error::Error;
use crate::error::RemoteError;
use crate::error::Result;
use crate::exposed::Exposed;
use crate::functions::FunctionTable;
use crate::thread::Thread;
use crate::transport::Transport;
use crate::transport::TransportError;
use crate::value::LocalFunction;
use crate::value::Value;

type Settle = oneshot::Sender<Result<Value>>;

/// The object incoming calls resolve against.
///
/// Closing releases it: exposed methods often hold a [`Thread`] back to this
/// same endpoint.
enum ExposedSlot {
    Empty,
    Set(Exposed),
    Released,
}

/// State shared by an endpoint's handles, tasks and remote function handles.
pub(crate) struct Inner {
    name: String,
    call_timeout: Option<Duration>,
    transport: Arc<dyn Transport>,
    pub(crate) supports_transfer: bool,
    exposed: Mutex<ExposedSlot>,
    outbox: mpsc::UnboundedSender<Envelope>,
    pending: DashMap<CallId, Settle>,
    pub(crate) functions: FunctionTable,
    next_call_id: AtomicU64,
    closed: AtomicBool,
    closed_tx: watch::Sender<bool>,
    reader: OnceLock<AbortHandle>,
}

/// A handle to one side of a channel.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Endpoint {
    inner: Arc<Inner>,
}

impl Endpoint {
    /// Creates an endpoint over `transport` with default settings.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: impl Transport) -> Self {
        Self::builder(transport).build()
    }

    pub fn builder(transport: impl Transport) -> EndpointBuilder {
        EndpointBuilder::new(transport)
    }

    pub(crate) fn start(
        transport: Arc<dyn Transport>,
        name: String,
        exposed: Option<Exposed>,
        call_timeout: Option<Duration>,
    ) -> Self {
        let (outbox, queue) = mpsc::unbounded_channel();
        let (closed_tx, _) = watch::channel(false);
        let exposed_slot = match exposed {
            Some(exposed) => ExposedSlot::Set(exposed),
            None => ExposedSlot::Empty,
        };

        let inner = Arc::new(Inner {
            name,
            call_timeout,
            supports_transfer: transport.supports_transfer(),
            transport: Arc::clone(&transport),
            exposed: Mutex::new(exposed_slot),
            outbox,
            pending: DashMap::new(),
            functions: FunctionTable::new(),
            next_call_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            closed_tx,
            reader: OnceLock::new(),
        });

        tokio::spawn(write_loop(
            inner.name.clone(),
            Arc::downgrade(&inner),
            Arc::clone(&transport),
            queue,
        ));
        let reader = tokio::spawn(read_loop(Arc::downgrade(&inner), transport));
        let _ = inner.reader.set(reader.abort_handle());

        debug!(endpoint = %inner.name, "endpoint started");
        Self { inner }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Sets the object incoming calls resolve against.
    ///
    /// An endpoint exposes at most one object, for its whole lifetime.
    /// A closed endpoint accepts none.
    pub fn expose(&self, exposed: Exposed) -> Result<()> {
        let mut slot = self.inner.lock_exposed();
        match *slot {
            ExposedSlot::Empty => {
                *slot = ExposedSlot::Set(exposed);
                Ok(())
            }
            ExposedSlot::Set(_) => Err(Error::AlreadyExposed),
            ExposedSlot::Released => Err(Error::Closed),
        }
    }

    /// Calls the method at `path` on the other side.
    ///
    /// Arguments are encoded before this returns: an argument that cannot be
    /// encoded fails here and nothing is sent.
    pub fn call<S: AsRef<str>>(&self, path: &[S], args: Vec<Value>) -> Result<PendingCall> {
        if path.is_empty() {
            return Err(Error::Undefined(String::new()));
        }
        let path: Vec<String> = path.iter().map(|s| s.as_ref().to_string()).collect();
        trace!(endpoint = %self.inner.name, path = ?path, "outgoing call");
        self.inner.start_call(&args, move |id, args| Message::Call { id, path, args })
    }

    /// A proxy over this endpoint that accepts any method name.
    pub fn thread(&self) -> Thread {
        Thread::new(self.clone())
    }

    /// Closes the endpoint. Idempotent.
    ///
    /// Every pending call rejects with [`Error::Closed`] and functions sent to
    /// the other side become unreachable.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Resolves once the endpoint is closed, from either side.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Number of calls awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Number of local functions the other side still holds references to.
    pub fn retained_functions(&self) -> usize {
        self.inner.functions.len()
    }

    pub fn retain_count(&self, id: FunctionId) -> u64 {
        self.inner.functions.retain_count(id)
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.inner.name)
            .field("closed", &self.is_closed())
            .field("pending", &self.pending_calls())
            .finish()
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(endpoint = %self.name, pending = self.pending.len(), "closing endpoint");

        let ids: Vec<CallId> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(Error::Closed));
            }
        }

        self.functions.clear();
        let released = std::mem::replace(&mut *self.lock_exposed(), ExposedSlot::Released);
        self.transport.close();
        self.closed_tx.send_replace(true);
        if let Some(reader) = self.reader.get() {
            reader.abort();
        }
        drop(released);
    }

    fn lock_exposed(&self) -> MutexGuard<'_, ExposedSlot> {
        self.exposed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, path: &[String]) -> Option<LocalFunction> {
        match &*self.lock_exposed() {
            ExposedSlot::Set(exposed) => exposed.resolve(path).cloned(),
            ExposedSlot::Empty | ExposedSlot::Released => None,
        }
    }

    /// Queues a message behind everything already in the outbox.
    pub(crate) fn post(&self, message: Message, transfer: Vec<Bytes>) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        trace!(endpoint = %self.name, kind = message.kind(), "posting message");
        self.outbox
            .send(Envelope::with_transfer(message, transfer))
            .map_err(|_| Error::Closed)
    }

    /// Tells the other side one reference to `id` is gone.
    pub(crate) fn send_release(&self, id: FunctionId) {
        if self.is_closed() {
            return;
        }
        if self.post(Message::Release { function_id: id }, Vec::new()).is_ok() {
            trace!(endpoint = %self.name, function = %id, "released remote function");
        }
    }

    /// Encodes `values`, builds a message around them and posts it.
    ///
    /// Retains taken while encoding are given back if the message never leaves.
    fn send_encoded(
        &self,
        values: &[Value],
        build: impl FnOnce(Vec<WireValue>) -> Message,
    ) -> Result<()> {
        let mut encoder = Encoder::new(self);
        let wire = match encoder.encode_all(values) {
            Ok(wire) => wire,
            Err(e) => {
                encoder.rollback();
                return Err(e.into());
            }
        };

        let (transfer, retained) = encoder.finish();
        if let Err(e) = self.post(build(wire), transfer) {
            self.functions.release_all(&retained);
            return Err(e);
        }
        Ok(())
    }

    fn start_call(
        self: &Arc<Self>,
        args: &[Value],
        build: impl FnOnce(CallId, Vec<WireValue>) -> Message,
    ) -> Result<PendingCall> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let id = CallId(self.next_call_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        // close() may have drained the map between the check above and the insert
        if self.is_closed() {
            self.pending.remove(&id);
            return Err(Error::Closed);
        }

        if let Err(e) = self.send_encoded(args, |args| build(id, args)) {
            self.pending.remove(&id);
            return Err(e);
        }

        let deadline = self.call_timeout.map(|timeout| Instant::now() + timeout);
        Ok(PendingCall {
            id,
            rx,
            endpoint: Arc::downgrade(self),
            deadline,
            sleep: None,
        })
    }

    /// Calls a function the other side sent us.
    pub(crate) fn call_function(
        self: &Arc<Self>,
        function_id: FunctionId,
        args: Vec<Value>,
    ) -> Result<PendingCall> {
        trace!(endpoint = %self.name, function = %function_id, "outgoing function call");
        self.start_call(&args, |id, args| Message::FunctionCall { id, function_id, args })
    }

    fn handle(self: &Arc<Self>, envelope: Envelope) {
        let Envelope { message, transfer } = envelope;
        trace!(endpoint = %self.name, kind = message.kind(), "received message");
        let decoder = Decoder::new(self, &transfer);

        match message {
            Message::Call { id, path, args } => {
                // decode first so references in args are released even on a miss
                let args = decoder.decode_all(args);
                let function = self.resolve(&path);
                match (args, function) {
                    (Err(e), _) => self.respond(id, Err(RemoteError::new(names::DECODE, e.to_string()))),
                    (Ok(_), None) => {
                        let message = format!("no method at '{}'", path.join("."));
                        self.respond(id, Err(RemoteError::new(names::METHOD_NOT_FOUND, message)));
                    }
                    (Ok(args), Some(function)) => self.invoke(id, function, args),
                }
            }
            Message::FunctionCall { id, function_id, args } => {
                let args = decoder.decode_all(args);
                let function = self.functions.get(function_id);
                match (args, function) {
                    (Err(e), _) => self.respond(id, Err(RemoteError::new(names::DECODE, e.to_string()))),
                    (Ok(_), None) => {
                        let message = format!("{} is not retained", function_id);
                        self.respond(id, Err(RemoteError::new(names::STALE_FUNCTION, message)));
                    }
                    (Ok(args), Some(function)) => self.invoke(id, function, args),
                }
            }
            Message::Result { id, value } => {
                // late responses are only decoded to release the functions they carry
                if !value.has_functions() && !self.pending.contains_key(&id) {
                    debug!(endpoint = %self.name, call = %id, "dropping response for unknown call");
                    return;
                }
                let value = decoder.decode(value).map_err(Error::from);
                self.settle(id, value);
            }
            Message::Error { id, error } => {
                self.settle(id, Err(Error::from_shape(error)));
            }
            Message::Retain { function_id } => {
                if !self.functions.retain_id(function_id) {
                    debug!(endpoint = %self.name, function = %function_id, "retain for unknown function");
                }
            }
            Message::Release { function_id } => match self.functions.release(function_id) {
                Some(0) => trace!(endpoint = %self.name, function = %function_id, "function evicted"),
                Some(_) => {}
                None => debug!(endpoint = %self.name, function = %function_id, "release for unknown function"),
            },
        }
    }

    fn invoke(self: &Arc<Self>, id: CallId, function: LocalFunction, args: Vec<Value>) {
        let endpoint = Arc::downgrade(self);
        tokio::spawn(async move {
            let result = function.invoke(args).await;
            match endpoint.upgrade() {
                Some(endpoint) => endpoint.respond(id, result),
                None => trace!(call = %id, "endpoint dropped before call finished"),
            }
        });
    }

    fn respond(&self, id: CallId, result: std::result::Result<Value, RemoteError>) {
        let outcome = match result {
            Ok(value) => match self.send_encoded(std::slice::from_ref(&value), |mut wire| {
                Message::Result { id, value: wire.pop().unwrap_or_default() }
            }) {
                Err(Error::Encode(e)) => {
                    let error = ErrorShape::new(names::ENCODE, e.to_string());
                    self.post(Message::Error { id, error }, Vec::new())
                }
                other => other,
            },
            Err(e) => self.post(Message::Error { id, error: e.into_shape() }, Vec::new()),
        };

        if let Err(e) = outcome {
            debug!(endpoint = %self.name, call = %id, error = %e, "dropping response");
        }
    }

    fn settle(&self, id: CallId, result: Result<Value>) {
        match self.pending.remove(&id) {
            Some((_, tx)) => {
                let _ = tx.send(result);
            }
            None => debug!(endpoint = %self.name, call = %id, "dropping response for unknown call"),
        }
    }

    fn forget(&self, id: CallId) {
        self.pending.remove(&id);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get() {
            reader.abort();
        }
    }
}

async fn write_loop(
    name: String,
    endpoint: Weak<Inner>,
    transport: Arc<dyn Transport>,
    mut queue: mpsc::UnboundedReceiver<Envelope>,
) {
    while let Some(envelope) = queue.recv().await {
        match transport.send(envelope).await {
            Ok(()) => {}
            Err(TransportError::Closed) => trace!(endpoint = %name, "dropping message after close"),
            Err(e) => {
                // a lost message is fatal to the endpoint
                warn!(endpoint = %name, error = %e, "failed to send message");
                if let Some(inner) = endpoint.upgrade() {
                    inner.close();
                }
                break;
            }
        }
    }
    transport.close();
    trace!(endpoint = %name, "writer stopped");
}

async fn read_loop(endpoint: Weak<Inner>, transport: Arc<dyn Transport>) {
    loop {
        let received = transport.recv().await;
        let Some(inner) = endpoint.upgrade() else {
            return;
        };

        match received {
            Ok(Some(envelope)) => inner.handle(envelope),
            Ok(None) => {
                debug!(endpoint = %inner.name, "channel closed by peer");
                inner.close();
                return;
            }
            Err(e) => {
                warn!(endpoint = %inner.name, error = %e, "transport failed");
                inner.close();
                return;
            }
        }
    }
}

/// A call awaiting its response.
///
/// Dropping it forgets the call: a response that arrives later is discarded.
#[must_use = "a call does nothing useful unless its response is awaited"]
pub struct PendingCall {
    id: CallId,
    rx: oneshot::Receiver<Result<Value>>,
    endpoint: Weak<Inner>,
    deadline: Option<Instant>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl PendingCall {
    pub fn id(&self) -> CallId {
        self.id
    }

    /// Rejects with [`Error::Canceled`] if `signal` completes before the response.
    ///
    /// Cancellation is local: the other side still runs the call and its
    /// response is discarded.
    pub async fn cancel_on<F: Future>(self, signal: F) -> Result<Value> {
        let id = self.id;
        tokio::select! {
            result = self => result,
            _ = signal => {
                trace!(call = %id, "call canceled");
                Err(Error::Canceled)
            }
        }
    }

    fn forget(&self) {
        if let Some(endpoint) = self.endpoint.upgrade() {
            endpoint.forget(self.id);
        }
    }
}

impl Future for PendingCall {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;

        if let Poll::Ready(result) = Pin::new(&mut this.rx).poll(cx) {
            // the sender only drops without sending when the endpoint is gone
            return Poll::Ready(result.unwrap_or_else(|_| Err(Error::Closed)));
        }

        if let Some(deadline) = this.deadline {
            let sleep = this.sleep.get_or_insert_with(|| Box::pin(tokio::time::sleep_until(deadline)));
            if sleep.as_mut().poll(cx).is_ready() {
                this.forget();
                return Poll::Ready(Err(Error::Timeout));
            }
        }

        Poll::Pending
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        self.forget();
    }
}

impl std::fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCall").field("id", &self.id).finish()
    }
}
