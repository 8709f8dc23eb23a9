//! # Endpoint Registry
//!
//! An explicit, owned collection of live endpoints. Code that needs to find
//! "the endpoint for X" holds a `Registry` instead of reaching for a global.
//!
//! Uses DashMap so endpoints can be registered and looked up from many tasks
//! without a global lock.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use tracing::debug;

use crate::endpoint::Endpoint;

/// Strong type for endpoint identifiers.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    EndpointNotFound(EndpointId),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EndpointNotFound(id) => write!(f, "Endpoint not found: {}", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Endpoints registered by id.
pub struct Registry {
    endpoints: DashMap<EndpointId, Endpoint>,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            endpoints: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers an endpoint and returns its unique ID.
    pub fn register(&self, endpoint: Endpoint) -> EndpointId {
        let id = EndpointId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(endpoint = %endpoint.name(), %id, "registered endpoint");
        self.endpoints.insert(id, endpoint);
        id
    }

    /// Retrieves an endpoint by ID.
    pub fn get(&self, id: EndpointId) -> Result<Endpoint> {
        self.endpoints
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::EndpointNotFound(id))
    }

    /// Finds the first endpoint (lowest id) with the given name.
    pub fn find(&self, name: &str) -> Option<(EndpointId, Endpoint)> {
        self.endpoints
            .iter()
            .filter(|entry| entry.value().name() == name)
            .map(|entry| (*entry.key(), entry.value().clone()))
            .min_by_key(|(id, _)| *id)
    }

    /// Removes an endpoint from the registry without closing it.
    pub fn remove(&self, id: EndpointId) -> Result<Endpoint> {
        self.endpoints
            .remove(&id)
            .map(|(_, endpoint)| endpoint)
            .ok_or(Error::EndpointNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Drops closed endpoints. Returns how many were removed.
    pub fn prune_closed(&self) -> usize {
        let before = self.endpoints.len();
        self.endpoints.retain(|_, endpoint| !endpoint.is_closed());
        before.saturating_sub(self.endpoints.len())
    }

    /// Closes and removes every endpoint.
    pub fn teardown(&self) {
        let ids: Vec<EndpointId> = self.endpoints.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, endpoint)) = self.endpoints.remove(&id) {
                endpoint.close();
            }
        }
    }
}
