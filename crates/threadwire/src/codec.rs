//! # Codec
//!
//! JSON framing for transports that move bytes rather than envelopes.
//!
//! ## Invariants
//! - Only messages that pass [`Message::validate`] are returned by `decode_message`.
//! - Byte transports carry no transfer list, so `Transfer` values are rejected on decode.

use crate::error::Result;
use crate::message::Envelope;
use crate::message::Message;

/// Serializes a message to JSON bytes (without a trailing newline).
pub fn encode_message(message: &Message) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(message)?)
}

/// Parses and validates a message from JSON bytes.
pub fn decode_message(bytes: &[u8]) -> Result<Message> {
    let envelope = Envelope::new(serde_json::from_slice(bytes)?);
    envelope.validate()?;
    Ok(envelope.message)
}
