//! # Threadwire
//!
//! The wire protocol spoken between two threadrun endpoints.
//!
//! ## Architecture
//!
//! Every interaction is one of six messages: a `Call` and its matching
//! `Result` or `Error`, a `FunctionCall` into a function that crossed the
//! channel earlier, and the `Retain`/`Release` pair that keeps those functions
//! alive on their origin side.
//!
//! Values travel as [`WireValue`] trees. Functions never travel themselves,
//! only their [`FunctionId`]. Binary payloads either travel inline or, when
//! the transport can move buffers natively, as an index into the
//! [`Envelope`]'s transfer list.
//!
//! Transports that move bytes (pipes, sockets) use the JSON codec in
//! [`codec`]. In-process transports move [`Envelope`]s untouched.

pub mod codec;
pub mod error;
pub mod message;
pub mod value;


pub use codec::decode_message;
pub use codec::encode_message;
pub use error::Result;
pub use error::WireError;
pub use message::CallId;
pub use message::Envelope;
pub use message::ErrorShape;
pub use message::FunctionId;
pub use message::Message;
pub use message::names;
pub use value::WireValue;
