//! # Worker Threads
//!
//! A [`Worker`] runs an exposed object on its own OS thread with its own
//! single-threaded runtime, connected to the host by an in-memory channel.
//! The host talks to it through a [`Thread`].

use std::thread::JoinHandle;

use tokio::sync::oneshot;
use tracing::info;
use tracing::warn;

use crate::endpoint::Endpoint;
use crate::error::Error;
use crate::error::Result;
use crate::exposed::Exposed;
use crate::memory_transport::MemoryTransport;
use crate::thread::Thread;

/// A worker thread and the host-side endpoint connected to it.
pub struct Worker {
    name: String,
    endpoint: Endpoint,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    /// Starts a worker whose exposed object is built by `setup`.
    ///
    /// `setup` runs on the worker thread and receives a [`Thread`] for calling
    /// back into the host. Resolves once the object is exposed.
    pub async fn spawn<F>(name: impl Into<String>, setup: F) -> Result<Self>
    where
        F: FnOnce(Thread) -> Exposed + Send + 'static,
    {
        Self::spawn_exposing(name, Exposed::new(), setup).await
    }

    /// Like [`Worker::spawn`], with `host` exposed to the worker.
    pub async fn spawn_exposing<F>(name: impl Into<String>, host: Exposed, setup: F) -> Result<Self>
    where
        F: FnOnce(Thread) -> Exposed + Send + 'static,
    {
        let name = name.into();
        let (host_side, worker_side) = MemoryTransport::pair();
        let (ready_tx, ready_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let endpoint = Endpoint::builder(host_side).name(name.clone()).expose(host).build();

        let worker_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || run(worker_name, worker_side, setup, ready_tx, shutdown_rx))
            .map_err(|e| Error::Spawn(e.to_string()))?;

        let mut worker = Self {
            name,
            endpoint,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        };

        match ready_rx.await {
            Ok(Ok(())) => {
                info!(worker = %worker.name, "worker started");
                Ok(worker)
            }
            Ok(Err(message)) => {
                worker.stop();
                Err(Error::Spawn(message))
            }
            Err(_) => {
                worker.stop();
                Err(Error::Spawn(format!("worker '{}' exited during setup", worker.name)))
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A proxy for the worker's exposed object.
    pub fn thread(&self) -> Thread {
        self.endpoint.thread()
    }

    /// The host side of the channel.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stops the worker and waits for its thread to exit.
    ///
    /// Calls still in flight reject with `Error::Closed`.
    pub async fn terminate(mut self) -> Result<()> {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let joined = tokio::task::spawn_blocking(move || handle.join())
                .await
                .map_err(|e| Error::Spawn(e.to_string()))?;
            if joined.is_err() {
                warn!(worker = %self.name, "worker thread panicked");
            }
        }
        info!(worker = %self.name, "worker terminated");
        Ok(())
    }

    fn stop(&mut self) {
        self.endpoint.close();
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// The body of the worker thread.
fn run<F>(
    name: String,
    transport: MemoryTransport,
    setup: F,
    ready: oneshot::Sender<std::result::Result<(), String>>,
    shutdown: oneshot::Receiver<()>,
) where
    F: FnOnce(Thread) -> Exposed,
{
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(format!("failed to start worker runtime: {}", e)));
            return;
        }
    };

    runtime.block_on(async move {
        let endpoint = Endpoint::builder(transport).name(format!("{}/worker", name)).build();
        let exposed = setup(endpoint.thread());
        if let Err(e) = endpoint.expose(exposed) {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
        let _ = ready.send(Ok(()));

        tokio::select! {
            _ = shutdown => {}
            _ = endpoint.closed() => {}
        }
        endpoint.close();
        info!(worker = %name, "worker stopped");
    });
}
