//! # Codec
//!
//! The translation layer between runtime [`Value`]s and [`WireValue`]s.
//!
//! ## Invariants
//! - **Recursion Safety**: Encoding is bounded by `MAX_RECURSION_DEPTH`.
//! - **Fast Path**: Values without functions never touch the function table.
//! - **Balanced Retains**: Every function retained by an `Encoder` is either
//!   sent or given back through `Encoder::rollback`.

use std::sync::Arc;

use bytes::Bytes;
use threadwire::FunctionId;
use threadwire::WireValue;

use crate::endpoint::Inner;
use crate::error::RemoteError;
use crate::value::Function;
use crate::value::LocalFunction;
use crate::value::RemoteFunction;
use crate::value::Value;

/// The maximum nesting depth for Values before failing.
const MAX_RECURSION_DEPTH: usize = 64;

/// Reasons a value cannot be sent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("non-finite float {0} cannot cross the channel")]
    NonFiniteFloat(f64),
    #[error("value nesting exceeds {} levels", MAX_RECURSION_DEPTH)]
    RecursionLimitExceeded,
    #[error("{0} was already released")]
    ReleasedFunction(FunctionId),
}

/// Reasons a received value cannot be materialized.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("{0} is not retained on this side")]
    StaleFunction(FunctionId),
    #[error("transfer index {index} out of range ({len} buffers transferred)")]
    TransferOutOfRange { index: u32, len: usize },
}

/// Encodes the values of one outgoing message.
pub(crate) struct Encoder<'a> {
    endpoint: &'a Inner,
    transfer: Vec<Bytes>,
    retained: Vec<FunctionId>,
}

impl<'a> Encoder<'a> {
    pub fn new(endpoint: &'a Inner) -> Self {
        Self {
            endpoint,
            transfer: Vec::new(),
            retained: Vec::new(),
        }
    }

    pub fn encode(&mut self, value: &Value) -> Result<WireValue, EncodeError> {
        self.encode_impl(value, 0)
    }

    pub fn encode_all(&mut self, values: &[Value]) -> Result<Vec<WireValue>, EncodeError> {
        values.iter().map(|v| self.encode(v)).collect()
    }

    /// Hands back the transfer list and the ids retained for this message.
    pub fn finish(self) -> (Vec<Bytes>, Vec<FunctionId>) {
        (self.transfer, self.retained)
    }

    /// Gives back every retain taken so far; the message will not be sent.
    pub fn rollback(self) {
        self.endpoint.functions.release_all(&self.retained);
    }

    fn encode_impl(&mut self, value: &Value, depth: usize) -> Result<WireValue, EncodeError> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(EncodeError::RecursionLimitExceeded);
        }

        Ok(match value {
            Value::Null => WireValue::Null,
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Integer(n) => WireValue::Integer(*n),
            Value::Float(n) if !n.is_finite() => return Err(EncodeError::NonFiniteFloat(*n)),
            Value::Float(n) => WireValue::Float(*n),
            Value::String(s) => WireValue::String(s.clone()),
            Value::Bytes(b) if self.endpoint.supports_transfer => {
                self.transfer.push(b.clone());
                WireValue::Transfer((self.transfer.len() - 1) as u32)
            }
            Value::Bytes(b) => WireValue::Bytes(b.clone()),
            Value::List(items) => WireValue::List(
                items
                    .iter()
                    .map(|item| self.encode_impl(item, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => WireValue::Map(
                entries
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.encode_impl(v, depth + 1)?)))
                    .collect::<Result<_, EncodeError>>()?,
            ),
            Value::Function(Function::Local(f)) => WireValue::Function(self.retain(f)),
            Value::Function(Function::Remote(f)) => self.encode_remote(f)?,
        })
    }

    fn retain(&mut self, function: &LocalFunction) -> FunctionId {
        let id = self.endpoint.functions.retain(function);
        self.retained.push(id);
        id
    }

    fn encode_remote(&mut self, function: &RemoteFunction) -> Result<WireValue, EncodeError> {
        if function.is_released() {
            return Err(EncodeError::ReleasedFunction(function.id()));
        }
        if function.belongs_to(self.endpoint) {
            return Ok(WireValue::Returned(function.id()));
        }

        // a function from another channel is forwarded through a local hop
        let target = function.clone();
        let hop = LocalFunction::new(move |args| {
            let target = target.clone();
            async move { Function::Remote(target).call(args).await.map_err(RemoteError::from) }
        });
        Ok(WireValue::Function(self.retain(&hop)))
    }
}

/// Decodes the values of one incoming message.
pub(crate) struct Decoder<'a> {
    endpoint: &'a Arc<Inner>,
    transfer: &'a [Bytes],
}

impl<'a> Decoder<'a> {
    pub fn new(endpoint: &'a Arc<Inner>, transfer: &'a [Bytes]) -> Self {
        Self { endpoint, transfer }
    }

    pub fn decode_all(&self, values: Vec<WireValue>) -> Result<Vec<Value>, DecodeError> {
        values.into_iter().map(|v| self.decode(v)).collect()
    }

    pub fn decode(&self, value: WireValue) -> Result<Value, DecodeError> {
        Ok(match value {
            WireValue::Null => Value::Null,
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::Integer(n) => Value::Integer(n),
            WireValue::Float(n) => Value::Float(n),
            WireValue::String(s) => Value::String(s),
            WireValue::Bytes(b) => Value::Bytes(b),
            WireValue::Transfer(index) => {
                let buffer = self.transfer.get(index as usize).ok_or(
                    DecodeError::TransferOutOfRange { index, len: self.transfer.len() },
                )?;
                Value::Bytes(buffer.clone())
            }
            WireValue::List(items) => Value::List(self.decode_all(items)?),
            WireValue::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Ok((k, self.decode(v)?)))
                    .collect::<Result<_, DecodeError>>()?,
            ),
            WireValue::Function(id) => {
                Value::Function(Function::Remote(RemoteFunction::new(id, Arc::downgrade(self.endpoint))))
            }
            WireValue::Returned(id) => {
                let function = self.endpoint.functions.get(id).ok_or(DecodeError::StaleFunction(id))?;
                Value::Function(Function::Local(function))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;
    use crate::memory_transport::MemoryTransport;
    use crate::stream_transport::StreamTransport;

    fn sample() -> Value {
        Value::map()
            .with("name", "quilt")
            .with("ratio", 0.5)
            .with("tags", Value::List(vec!["a".into(), Value::Null, true.into()]))
            .with("blob", Bytes::from_static(&[0, 1, 2]))
            .with("nested", Value::map().with("depth", 2i64))
    }

    #[tokio::test]
    async fn test_plain_values_roundtrip_without_retains() {
        let (a, _b) = MemoryTransport::pair();
        let endpoint = Endpoint::new(a);
        let inner = endpoint.inner();

        let value = sample();
        let mut encoder = Encoder::new(inner);
        let wire = encoder.encode(&value).unwrap();
        let (transfer, retained) = encoder.finish();

        assert!(retained.is_empty());
        assert_eq!(inner.functions.len(), 0);
        assert_eq!(transfer.len(), 1);

        let decoded = Decoder::new(inner, &transfer).decode(wire).unwrap();
        assert_eq!(decoded, value);
    }

    #[tokio::test]
    async fn test_bytes_inline_without_transfer_support() {
        let (reader, writer) = tokio::io::duplex(64);
        let endpoint = Endpoint::new(StreamTransport::new(reader, writer));
        let inner = endpoint.inner();

        let mut encoder = Encoder::new(inner);
        let wire = encoder.encode(&Value::Bytes(Bytes::from_static(b"xyz"))).unwrap();
        let (transfer, _) = encoder.finish();

        assert!(transfer.is_empty());
        assert_eq!(wire, WireValue::Bytes(Bytes::from_static(b"xyz")));
    }

    #[tokio::test]
    async fn test_functions_are_retained_per_occurrence() {
        let (a, _b) = MemoryTransport::pair();
        let endpoint = Endpoint::new(a);
        let inner = endpoint.inner();
        let f = Function::sync(|_| Ok(Value::Integer(1)));

        let mut encoder = Encoder::new(inner);
        let value = Value::List(vec![f.clone().into(), f.clone().into(), f.into()]);
        let wire = encoder.encode(&value).unwrap();
        let (_, retained) = encoder.finish();

        let WireValue::List(items) = wire else { panic!("Expected List") };
        let WireValue::Function(id) = items[0] else { panic!("Expected Function") };
        assert!(items.iter().all(|item| *item == WireValue::Function(id)));
        assert_eq!(retained, vec![id, id, id]);
        assert_eq!(inner.functions.retain_count(id), 3);
    }

    #[tokio::test]
    async fn test_failed_encoding_rolls_back_retains() {
        let (a, _b) = MemoryTransport::pair();
        let endpoint = Endpoint::new(a);
        let inner = endpoint.inner();

        let value = Value::List(vec![
            Function::sync(|_| Ok(Value::Null)).into(),
            Value::Float(f64::NAN),
        ]);
        let mut encoder = Encoder::new(inner);
        let err = encoder.encode(&value).unwrap_err();
        encoder.rollback();

        assert!(matches!(err, EncodeError::NonFiniteFloat(_)));
        assert_eq!(inner.functions.len(), 0);
    }

    #[tokio::test]
    async fn test_recursion_limit() {
        let (a, _b) = MemoryTransport::pair();
        let endpoint = Endpoint::new(a);

        let mut value = Value::Null;
        for _ in 0..=MAX_RECURSION_DEPTH + 1 {
            value = Value::List(vec![value]);
        }

        let mut encoder = Encoder::new(endpoint.inner());
        assert_eq!(encoder.encode(&value), Err(EncodeError::RecursionLimitExceeded));
    }

    #[tokio::test]
    async fn test_returned_function_resolves_locally() {
        let (a, _b) = MemoryTransport::pair();
        let endpoint = Endpoint::new(a);
        let inner = endpoint.inner();
        let f = LocalFunction::sync(|_| Ok(Value::Integer(7)));
        let id = inner.functions.retain(&f);

        let decoder = Decoder::new(inner, &[]);
        match decoder.decode(WireValue::Returned(id)).unwrap() {
            Value::Function(Function::Local(local)) => assert!(local.same_as(&f)),
            other => panic!("Expected local function, got {:?}", other),
        }
        assert_eq!(
            decoder.decode(WireValue::Returned(FunctionId(404))),
            Err(DecodeError::StaleFunction(FunctionId(404)))
        );
        assert_eq!(
            decoder.decode(WireValue::Transfer(3)),
            Err(DecodeError::TransferOutOfRange { index: 3, len: 0 })
        );
    }
}
