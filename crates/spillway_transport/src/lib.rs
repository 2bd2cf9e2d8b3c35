//! SPILLWAY Transport
//!
//! The capability seam between the correlation core and any concrete
//! messaging backend: publish a request, poll a shared response queue,
//! acknowledge, and dead-letter. Includes an in-memory channel transport
//! used for local execution and tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod memory;
pub mod message;
pub mod transport;

pub use error::TransportError;
pub use memory::ChannelTransport;
pub use message::{MessageReceipt, QueueMessage, CONTROL_STOP};
pub use transport::Transport;
