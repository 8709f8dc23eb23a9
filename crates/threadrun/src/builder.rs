//! # Endpoint Builder
//!
//! Provides a fluent API for configuring an endpoint before its tasks start.

use std::sync::Arc;
use std::time::Duration;

use crate::endpoint::Endpoint;
use crate::exposed::Exposed;
use crate::transport::Transport;

/// Fluent builder for an [`Endpoint`].
///
/// ```ignore
/// let endpoint = Endpoint::builder(transport)
///     .name("host")
///     .expose(Exposed::new().sync_method("ping", |_| Ok("pong".into())))
///     .call_timeout(Duration::from_secs(5))
///     .build();
/// ```
pub struct EndpointBuilder {
    transport: Arc<dyn Transport>,
    name: String,
    exposed: Option<Exposed>,
    call_timeout: Option<Duration>,
}

impl EndpointBuilder {
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Arc::new(transport),
            name: "endpoint".to_string(),
            exposed: None,
            call_timeout: None,
        }
    }

    /// The name used in logs and registry lookups.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Exposes an object from the start, before any message can arrive.
    pub fn expose(mut self, exposed: Exposed) -> Self {
        self.exposed = Some(exposed);
        self
    }

    /// Rejects calls with `Error::Timeout` when no response arrives in time.
    ///
    /// Calls never time out by default.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Starts the endpoint's reader and writer tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Endpoint {
        Endpoint::start(self.transport, self.name, self.exposed, self.call_timeout)
    }
}
