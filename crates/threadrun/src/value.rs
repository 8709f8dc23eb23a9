//! # Values
//!
//! The dynamic value type passed to and returned from remote calls.
//!
//! A [`Value`] is a tree of plain data that may also contain functions. A
//! [`Function`] is either local (a closure owned by this side) or remote (a
//! handle to a function that lives on the other side of a channel). Both are
//! called the same way.
//!
//! ## Remote function lifetime
//!
//! Each [`RemoteFunction`] handle owns one reference on its origin side.
//! Clones share that reference. The reference is given back with a `Release`
//! message when the handle is released explicitly or when its last clone is
//! dropped. [`RemoteFunction::retain`] asks the origin for an additional,
//! independent reference.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use threadwire::FunctionId;
use threadwire::Message;
use threadwire::names;

use crate::endpoint::Inner;
use crate::endpoint::PendingCall;
use crate::error::Error;
use crate::error::RemoteError;
use crate::error::Result;

/// The future returned by a local function.
pub type FunctionFuture = BoxFuture<'static, std::result::Result<Value, RemoteError>>;

type Callable = dyn Fn(Vec<Value>) -> FunctionFuture + Send + Sync;

/// A function implemented on this side of the channel.
///
/// Identity matters: encoding the same `LocalFunction` (or a clone of it)
/// several times reuses one entry in the endpoint's function table.
#[derive(Clone)]
pub struct LocalFunction(Arc<Callable>);

impl LocalFunction {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, RemoteError>> + Send + 'static,
    {
        Self(Arc::new(move |args| f(args).boxed()))
    }

    /// Wraps a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, RemoteError> + Send + Sync + 'static,
    {
        Self(Arc::new(move |args| futures::future::ready(f(args)).boxed()))
    }

    /// Runs the function.
    ///
    /// A panic while building or polling the future resolves to a `Panic` error.
    pub fn invoke(&self, args: Vec<Value>) -> FunctionFuture {
        let callable = Arc::clone(&self.0);
        async move {
            let future = match std::panic::catch_unwind(AssertUnwindSafe(|| (*callable)(args))) {
                Ok(future) => future,
                Err(payload) => return Err(panic_error(payload)),
            };
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(panic_error(payload)),
            }
        }
        .boxed()
    }

    /// Whether both handles point at the same closure.
    pub fn same_as(&self, other: &LocalFunction) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl fmt::Debug for LocalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalFunction({:#x})", self.addr())
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> RemoteError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "function panicked".to_string());
    RemoteError::new(names::PANIC, message)
}

/// A handle to a function owned by the other side of a channel.
#[derive(Clone)]
pub struct RemoteFunction {
    handle: Arc<RemoteHandle>,
}

struct RemoteHandle {
    id: FunctionId,
    endpoint: Weak<Inner>,
    released: AtomicBool,
}

impl RemoteHandle {
    fn release(&self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(endpoint) = self.endpoint.upgrade() {
            endpoint.send_release(self.id);
        }
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl RemoteFunction {
    pub(crate) fn new(id: FunctionId, endpoint: Weak<Inner>) -> Self {
        Self {
            handle: Arc::new(RemoteHandle {
                id,
                endpoint,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> FunctionId {
        self.handle.id
    }

    pub fn is_released(&self) -> bool {
        self.handle.released.load(Ordering::Acquire)
    }

    /// Sends a `FunctionCall` to the origin and returns the pending response.
    pub fn call(&self, args: Vec<Value>) -> Result<PendingCall> {
        if self.is_released() {
            return Err(self.stale());
        }
        let endpoint = self.handle.endpoint.upgrade().ok_or(Error::Closed)?;
        endpoint.call_function(self.handle.id, args)
    }

    /// Takes one more reference on the origin side.
    ///
    /// The returned handle is independent: it sends its own `Release`.
    pub fn retain(&self) -> Result<RemoteFunction> {
        if self.is_released() {
            return Err(self.stale());
        }
        let endpoint = self.handle.endpoint.upgrade().ok_or(Error::Closed)?;
        endpoint.post(Message::Retain { function_id: self.handle.id }, Vec::new())?;
        Ok(Self::new(self.handle.id, Weak::clone(&self.handle.endpoint)))
    }

    /// Gives the reference back now instead of when the last clone drops.
    ///
    /// Clones of this handle are released too.
    pub fn release(self) {
        self.handle.release();
    }

    pub(crate) fn belongs_to(&self, endpoint: &Inner) -> bool {
        std::ptr::eq(self.handle.endpoint.as_ptr(), endpoint)
    }

    fn stale(&self) -> Error {
        Error::StaleFunction(RemoteError::new(
            names::STALE_FUNCTION,
            format!("{} was already released", self.handle.id),
        ))
    }
}

impl fmt::Debug for RemoteFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RemoteFunction({})", self.handle.id)
    }
}

/// A callable value, local or remote.
#[derive(Clone, Debug)]
pub enum Function {
    Local(LocalFunction),
    Remote(RemoteFunction),
}

impl Function {
    /// A local function from an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Value, RemoteError>> + Send + 'static,
    {
        Self::Local(LocalFunction::new(f))
    }

    /// A local function from a synchronous closure.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(Vec<Value>) -> std::result::Result<Value, RemoteError> + Send + Sync + 'static,
    {
        Self::Local(LocalFunction::sync(f))
    }

    /// Calls the function, wherever it lives.
    pub async fn call(&self, args: Vec<Value>) -> Result<Value> {
        match self {
            Self::Local(f) => f.invoke(args).await.map_err(Error::Remote),
            Self::Remote(f) => f.call(args)?.await,
        }
    }
}

impl PartialEq for Function {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Local(a), Self::Local(b)) => a.same_as(b),
            (Self::Remote(a), Self::Remote(b)) => {
                a.id() == b.id() && Weak::ptr_eq(&a.handle.endpoint, &b.handle.endpoint)
            }
            _ => false,
        }
    }
}

/// A dynamically typed value that can cross a channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Bytes),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Function(Function),
}

impl Value {
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Floats, and integers widened to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Integer(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_function(self) -> Option<Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Looks up a key in a map value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map()?.get(key)
    }

    /// Inserts into a map value, returning `self` for chaining. No-op on non-maps.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        if let Value::Map(entries) = &mut self {
            entries.insert(key.into(), value.into());
        }
        self
    }

    /// Builds a value from anything serde can serialize.
    pub fn from_serde<T: Serialize + ?Sized>(value: &T) -> std::result::Result<Self, ConversionError> {
        Ok(Self::from_json(serde_json::to_value(value)?))
    }

    /// Deserializes a function-free value into `T`.
    ///
    /// Bytes become arrays of numbers.
    pub fn into_serde<T: DeserializeOwned>(&self) -> std::result::Result<T, ConversionError> {
        Ok(serde_json::from_value(self.to_json()?)?)
    }

    fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect(),
            ),
        }
    }

    fn to_json(&self) -> std::result::Result<serde_json::Value, ConversionError> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Integer(n) => serde_json::Value::from(*n),
            Value::Float(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or(ConversionError::NonFiniteFloat(*n))?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::from(b.to_vec()),
            Value::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<std::result::Result<_, _>>()?,
            ),
            Value::Map(entries) => serde_json::Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), v.to_json()?)))
                    .collect::<std::result::Result<_, ConversionError>>()?,
            ),
            Value::Function(_) => return Err(ConversionError::Function),
        })
    }
}

/// Failures converting between [`Value`] and serde types.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("functions have no serde representation")]
    Function,
    #[error("non-finite float {0} has no serde representation")]
    NonFiniteFloat(f64),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Bytes> for Value {
    fn from(b: Bytes) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(entries)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<LocalFunction> for Value {
    fn from(f: LocalFunction) -> Self {
        Value::Function(Function::Local(f))
    }
}

impl From<RemoteFunction> for Value {
    fn from(f: RemoteFunction) -> Self {
        Value::Function(Function::Remote(f))
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Value::Null, Into::into)
    }
}
