//! # Thread Proxy
//!
//! A [`Thread`] is a view over an endpoint that turns member lookups into
//! remote calls. It holds no state of its own beyond a path prefix and an
//! optional [`Shape`], so it is free to clone and never needs closing.

use crate::endpoint::Endpoint;
use crate::endpoint::PendingCall;
use crate::error::Error;
use crate::error::Result;
use crate::exposed::Shape;
use crate::value::Value;

/// A proxy for the object exposed on the other side of an endpoint.
#[derive(Clone, Debug)]
pub struct Thread {
    endpoint: Endpoint,
    prefix: Vec<String>,
    shape: Option<Shape>,
}

impl Thread {
    /// A proxy that maps every name to a remote method.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            prefix: Vec::new(),
            shape: None,
        }
    }

    /// A proxy limited to the members of `shape`. Other names are undefined.
    pub fn with_shape(endpoint: Endpoint, shape: Shape) -> Self {
        Self {
            endpoint,
            prefix: Vec::new(),
            shape: Some(shape),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The namespace path this proxy calls under.
    pub fn path(&self) -> &[String] {
        &self.prefix
    }

    /// Looks up a method. Nothing is sent.
    pub fn get(&self, name: &str) -> Option<ThreadMethod> {
        if let Some(shape) = &self.shape {
            if !shape.has_method(name) {
                return None;
            }
        }
        Some(ThreadMethod {
            endpoint: self.endpoint.clone(),
            path: self.child_path(name),
        })
    }

    /// A proxy for a nested namespace.
    pub fn namespace(&self, name: &str) -> Option<Thread> {
        let shape = match &self.shape {
            Some(shape) => Some(shape.nested(name)?.clone()),
            None => None,
        };
        Some(Thread {
            endpoint: self.endpoint.clone(),
            prefix: self.child_path(name),
            shape,
        })
    }

    /// Calls a method by name. Each invocation is its own round trip.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<PendingCall> {
        match self.get(name) {
            Some(method) => method.call(args),
            None => Err(Error::Undefined(self.child_path(name).join("."))),
        }
    }

    fn child_path(&self, name: &str) -> Vec<String> {
        let mut path = self.prefix.clone();
        path.push(name.to_string());
        path
    }
}

/// A remote method bound to its path.
#[derive(Clone, Debug)]
pub struct ThreadMethod {
    endpoint: Endpoint,
    path: Vec<String>,
}

impl ThreadMethod {
    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn call(&self, args: Vec<Value>) -> Result<PendingCall> {
        self.endpoint.call(&self.path, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_transport::MemoryTransport;

    #[tokio::test]
    async fn test_lookup_without_shape() {
        let (a, _b) = MemoryTransport::pair();
        let thread = Thread::new(Endpoint::new(a));

        let method = thread.get("anything").unwrap();
        assert_eq!(method.path(), ["anything"]);

        let nested = thread.namespace("math").unwrap().namespace("trig").unwrap();
        assert_eq!(nested.get("sin").unwrap().path(), ["math", "trig", "sin"]);
        assert_eq!(thread.endpoint().pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_shape_limits_lookup() {
        let (a, _b) = MemoryTransport::pair();
        let shape = Shape::new().method("add").namespace("math", Shape::new().method("neg"));
        let thread = Thread::with_shape(Endpoint::new(a), shape);

        assert!(thread.get("add").is_some());
        assert!(thread.get("sub").is_none());
        assert!(thread.get("math").is_none());
        assert!(thread.namespace("add").is_none());

        let math = thread.namespace("math").unwrap();
        assert!(math.get("neg").is_some());
        assert!(math.get("add").is_none());

        match math.call("pos", vec![]) {
            Err(Error::Undefined(path)) => assert_eq!(path, "math.pos"),
            other => panic!("Expected Undefined, got {:?}", other),
        }
        assert_eq!(thread.endpoint().pending_calls(), 0);
    }
}
