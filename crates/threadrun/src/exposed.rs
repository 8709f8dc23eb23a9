//! # Exposed Objects
//!
//! The tree of named members an endpoint answers calls against, and the
//! [`Shape`] a caller can use to describe that tree ahead of time.

use std::collections::BTreeMap;
use std::future::Future;

use crate::error::RemoteError;
use crate::value::LocalFunction;
use crate::value::Value;

/// A member of an exposed object.
#[derive(Clone, Debug)]
pub enum Member {
    Method(LocalFunction),
    Namespace(Exposed),
}

/// A tree of callable members, built once and then exposed on an endpoint.
///
/// ```ignore
/// let exposed = Exposed::new()
///     .sync_method("add", |args| Ok(Value::Integer(sum(&args))))
///     .namespace("math", Exposed::new().sync_method("neg", neg));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Exposed {
    members: BTreeMap<String, Member>,
}

impl Exposed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an async method. A later member with the same name replaces it.
    pub fn method<F, Fut>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, RemoteError>> + Send + 'static,
    {
        self.function(name, LocalFunction::new(f))
    }

    /// Adds a synchronous method.
    pub fn sync_method<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, RemoteError> + Send + Sync + 'static,
    {
        self.function(name, LocalFunction::sync(f))
    }

    /// Adds an existing function as a method.
    pub fn function(mut self, name: impl Into<String>, f: LocalFunction) -> Self {
        self.members.insert(name.into(), Member::Method(f));
        self
    }

    /// Nests another exposed object under `name`.
    pub fn namespace(mut self, name: impl Into<String>, exposed: Exposed) -> Self {
        self.members.insert(name.into(), Member::Namespace(exposed));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Walks a call path down to a method.
    ///
    /// Returns `None` for an empty path, a missing member, or a path that
    /// ends on a namespace.
    pub fn resolve(&self, path: &[String]) -> Option<&LocalFunction> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for segment in parents {
            match current.members.get(segment)? {
                Member::Namespace(inner) => current = inner,
                Member::Method(_) => return None,
            }
        }
        match current.members.get(last)? {
            Member::Method(f) => Some(f),
            Member::Namespace(_) => None,
        }
    }

    /// The shape a caller would use to describe this object.
    pub fn shape(&self) -> Shape {
        let members = self
            .members
            .iter()
            .map(|(name, member)| {
                let kind = match member {
                    Member::Method(_) => ShapeMember::Method,
                    Member::Namespace(inner) => ShapeMember::Namespace(inner.shape()),
                };
                (name.clone(), kind)
            })
            .collect();
        Shape { members }
    }
}

/// A member in a [`Shape`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeMember {
    Method,
    Namespace(Shape),
}

/// The names a thread is allowed to call.
///
/// Calls outside the shape fail locally without sending anything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Shape {
    members: BTreeMap<String, ShapeMember>,
}

impl Shape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.members.insert(name.into(), ShapeMember::Method);
        self
    }

    pub fn namespace(mut self, name: impl Into<String>, shape: Shape) -> Self {
        self.members.insert(name.into(), ShapeMember::Namespace(shape));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ShapeMember> {
        self.members.get(name)
    }

    pub fn has_method(&self, name: &str) -> bool {
        matches!(self.members.get(name), Some(ShapeMember::Method))
    }

    pub fn nested(&self, name: &str) -> Option<&Shape> {
        match self.members.get(name)? {
            ShapeMember::Namespace(shape) => Some(shape),
            ShapeMember::Method => None,
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    fn calculator() -> Exposed {
        Exposed::new()
            .sync_method("add", |args| {
                Ok(Value::Integer(args.iter().filter_map(Value::as_i64).sum()))
            })
            .namespace(
                "math",
                Exposed::new()
                    .sync_method("neg", |args| Ok(Value::Integer(-args[0].as_i64().unwrap_or(0))))
                    .namespace("deep", Exposed::new().sync_method("zero", |_| Ok(Value::Integer(0)))),
            )
    }

    #[tokio::test]
    async fn test_resolve_nested_paths() {
        let exposed = calculator();

        let add = exposed.resolve(&path(&["add"])).unwrap();
        assert_eq!(add.invoke(vec![Value::Integer(2), Value::Integer(3)]).await, Ok(Value::Integer(5)));

        let neg = exposed.resolve(&path(&["math", "neg"])).unwrap();
        assert_eq!(neg.invoke(vec![Value::Integer(4)]).await, Ok(Value::Integer(-4)));

        assert!(exposed.resolve(&path(&["math", "deep", "zero"])).is_some());
    }

    #[test]
    fn test_resolve_misses() {
        let exposed = calculator();

        assert!(exposed.resolve(&[]).is_none());
        assert!(exposed.resolve(&path(&["sub"])).is_none());
        assert!(exposed.resolve(&path(&["math"])).is_none());
        assert!(exposed.resolve(&path(&["add", "more"])).is_none());
        assert!(exposed.resolve(&path(&["math", "pos"])).is_none());
    }

    #[test]
    fn test_shape_mirrors_exposed() {
        let shape = calculator().shape();
        let expected = Shape::new()
            .method("add")
            .namespace("math", Shape::new().method("neg").namespace("deep", Shape::new().method("zero")));

        assert_eq!(shape, expected);
        assert!(shape.has_method("add"));
        assert!(!shape.has_method("math"));
        assert!(shape.nested("math").unwrap().has_method("neg"));
        assert_eq!(shape.names().collect::<Vec<_>>(), vec!["add", "math"]);
    }
}
