//! # Wire Values
//!
//! The serializable mirror of a runtime value. Functions appear only as ids.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Deserialize;
use serde::Serialize;

use crate::message::FunctionId;

/// A value as it crosses the channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    /// Always finite; JSON has no representation for NaN or infinities.
    Float(f64),
    String(String),
    /// Binary data copied into the message.
    Bytes(Bytes),
    /// Binary data moved by the transport, indexing the envelope's transfer list.
    Transfer(u32),
    List(Vec<WireValue>),
    Map(BTreeMap<String, WireValue>),
    /// A function owned by the sender of this message.
    Function(FunctionId),
    /// A function owned by the receiver of this message, handed back to it.
    Returned(FunctionId),
}

impl WireValue {
    /// True if any function reference appears anywhere inside the value.
    pub fn has_functions(&self) -> bool {
        match self {
            Self::Function(_) | Self::Returned(_) => true,
            Self::List(items) => items.iter().any(Self::has_functions),
            Self::Map(entries) => entries.values().any(Self::has_functions),
            _ => false,
        }
    }
}
