//! # Messages
//!
//! The six message kinds and the envelope that carries them.
//!
//! ## Invariants
//!
//! - A `CallId` is chosen by the sender of a `Call` or `FunctionCall` and
//!   echoed unchanged in the matching `Result` or `Error`.
//! - A `FunctionId` always names an entry in the function table of the side
//!   that first sent the function.
//! - A `Call` path is never empty.

use std::fmt;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::WireError;
use crate::value::WireValue;

/// Correlates a call with its response. Unique per sender for the lifetime of a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(pub u64);

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "call-{}", self.0)
    }
}

/// Names a function in its origin's function table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub u64);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn-{}", self.0)
    }
}

/// Well-known error names carried in [`ErrorShape::name`].
pub mod names {
    /// The call path did not resolve against the exposed object.
    pub const METHOD_NOT_FOUND: &str = "MethodNotFound";
    /// A `FunctionCall` targeted a function that is no longer retained.
    pub const STALE_FUNCTION: &str = "StaleFunctionReference";
    /// The receiver could not decode the arguments.
    pub const DECODE: &str = "DecodeError";
    /// The receiver could not encode the return value.
    pub const ENCODE: &str = "EncodeError";
    /// The invoked function panicked.
    pub const PANIC: &str = "Panic";
    /// Anything else.
    pub const GENERIC: &str = "Error";
}

/// Serializable description of a failure on the remote side.
///
/// Stack traces are best-effort and may be absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorShape {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }
}

/// A single protocol message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Message {
    /// Invoke the exposed member at `path`.
    Call {
        id: CallId,
        path: Vec<String>,
        args: Vec<WireValue>,
    },
    /// Successful completion of call `id`.
    Result { id: CallId, value: WireValue },
    /// Failed completion of call `id`.
    Error { id: CallId, error: ErrorShape },
    /// Invoke a function the receiver sent earlier.
    FunctionCall {
        id: CallId,
        function_id: FunctionId,
        args: Vec<WireValue>,
    },
    /// The sender holds one more reference to `function_id`.
    Retain { function_id: FunctionId },
    /// The sender dropped one reference to `function_id`.
    Release { function_id: FunctionId },
}

impl Message {
    /// Short name of the message kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Result { .. } => "result",
            Self::Error { .. } => "error",
            Self::FunctionCall { .. } => "function_call",
            Self::Retain { .. } => "retain",
            Self::Release { .. } => "release",
        }
    }

    /// The call id this message belongs to, if any.
    pub fn call_id(&self) -> Option<CallId> {
        match self {
            Self::Call { id, .. }
            | Self::Result { id, .. }
            | Self::Error { id, .. }
            | Self::FunctionCall { id, .. } => Some(*id),
            Self::Retain { .. } | Self::Release { .. } => None,
        }
    }

    /// Checks structural rules that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Call { path, .. } if path.is_empty() => {
                Err(WireError::ProtocolViolation("call path is empty".into()))
            }
            _ => Ok(()),
        }
    }

    fn values(&self) -> &[WireValue] {
        match self {
            Self::Call { args, .. } | Self::FunctionCall { args, .. } => args,
            Self::Result { value, .. } => std::slice::from_ref(value),
            _ => &[],
        }
    }
}

/// A message plus the buffers the transport moves alongside it.
///
/// `WireValue::Transfer(i)` inside the message refers to `transfer[i]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub message: Message,
    pub transfer: Vec<Bytes>,
}

impl Envelope {
    /// Wraps a message with nothing to transfer.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            transfer: Vec::new(),
        }
    }

    pub fn with_transfer(message: Message, transfer: Vec<Bytes>) -> Self {
        Self { message, transfer }
    }

    /// Validates the message and every transfer reference in it.
    pub fn validate(&self) -> Result<()> {
        self.message.validate()?;
        let len = self.transfer.len();
        let mut stack: Vec<&WireValue> = self.message.values().iter().collect();
        while let Some(value) = stack.pop() {
            match value {
                WireValue::Transfer(index) if *index as usize >= len => {
                    return Err(WireError::TransferOutOfRange { index: *index, len });
                }
                WireValue::List(items) => stack.extend(items),
                WireValue::Map(entries) => stack.extend(entries.values()),
                _ => {}
            }
        }
        Ok(())
    }
}
