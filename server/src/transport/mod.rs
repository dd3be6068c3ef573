//! # Queue Transport
//!
//! The broker seen by the correlation layer: a request queue to send to and a
//! session-enabled response queue to receive from. Anything that can send, receive
//! by session, receive from any session and peek can back a connection.
//!
//! - [`ServiceBusTransport`] - Azure Service Bus queue pair
//! - [`InMemoryTransport`] - in-process broker used by tests and loopback setups

use crate::common::RelayResult;
use crate::model::{BrokeredMessage, OutboundMessage};
use async_trait::async_trait;
use std::time::Duration;

pub mod in_memory;
pub mod service_bus;

pub use in_memory::InMemoryTransport;
pub use service_bus::ServiceBusTransport;

/// Result of one pull from a session receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiveOutcome {
    /// A reply arrived.
    Message(BrokeredMessage),
    /// A message arrived that cannot be correlated. It was settled and dropped;
    /// the wait time is not used up.
    Discarded,
    /// Nothing arrived within the wait time.
    Empty,
    /// The session will not deliver anything more.
    Closed,
}

/// A request/response queue pair.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Puts a request on the request queue and returns its message ID.
    async fn send(&self, message: OutboundMessage) -> RelayResult<String>;

    /// Opens a receiver that only sees replies tagged with `session_id`.
    async fn accept_session(&self, session_id: &str) -> RelayResult<Box<dyn SessionReceiver>>;

    /// Takes one reply from whichever session has one, completing it.
    async fn receive_any(&self, max_wait: Duration) -> RelayResult<Option<BrokeredMessage>>;

    /// Looks at the next reply without consuming it.
    async fn peek(&self) -> RelayResult<Option<BrokeredMessage>>;

    /// Releases the underlying connection. Further calls fail.
    async fn close(&self) -> RelayResult<()>;
}

/// Single-owner receive scope over one session of the response queue.
#[async_trait]
pub trait SessionReceiver: Send {
    async fn receive(&mut self, max_wait: Duration) -> RelayResult<ReceiveOutcome>;

    /// Acknowledges a message returned by [`receive`](SessionReceiver::receive).
    async fn complete(&mut self, message: &BrokeredMessage) -> RelayResult<()>;

    async fn close(self: Box<Self>) -> RelayResult<()>;
}
