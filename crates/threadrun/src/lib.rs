//! # Threadrun
//!
//! Remote procedure calls between two contexts joined by a message channel:
//! threads, tasks, child processes or socket peers.
//!
//! One side exposes an object ([`Exposed`]); the other calls it through a
//! [`Thread`]. Both sides are [`Endpoint`]s, so calls flow in either
//! direction over the same channel. Functions passed as arguments or results
//! cross the channel by reference and can be called back; binary payloads
//! move without a copy when the transport allows it.
//!
//! ```ignore
//! let (a, b) = MemoryTransport::pair();
//! let server = Endpoint::builder(b)
//!     .expose(Exposed::new().sync_method("add", add))
//!     .build();
//! let client = Endpoint::new(a);
//! let sum = client.thread().call("add", vec![1.into(), 2.into()])?.await?;
//! ```

pub mod builder;
pub mod codec;
pub mod endpoint;
pub mod error;
pub mod exposed;
mod functions;
pub mod memory_transport;
pub mod registry;
pub mod stream_transport;
pub mod thread;
pub mod transport;
pub mod value;
pub mod worker;


pub use builder::EndpointBuilder;
pub use endpoint::Endpoint;
pub use endpoint::PendingCall;
pub use error::Error;
pub use error::RemoteError;
pub use error::Result;
pub use exposed::Exposed;
pub use exposed::Shape;
pub use memory_transport::MemoryTransport;
pub use registry::EndpointId;
pub use registry::Registry;
pub use stream_transport::StreamTransport;
pub use thread::Thread;
pub use thread::ThreadMethod;
pub use transport::ClosedSend;
pub use transport::Transport;
pub use transport::TransportError;
pub use value::Function;
pub use value::LocalFunction;
pub use value::RemoteFunction;
pub use value::Value;
pub use threadwire::FunctionId;
pub use threadwire::CallId;
