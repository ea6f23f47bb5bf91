//! Broker client abstraction.
//!
//! `BrokerChannel` is the narrow surface the dispatcher needs (publish and
//! settle); `BrokerClient` adds the topology and consumption calls the worker
//! lifecycle uses. `AmqpBroker` talks to RabbitMQ; `InMemoryBroker` implements
//! the same contract in-process.

pub mod amqp;
pub mod delivery;
pub mod memory;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

pub use amqp::AmqpBroker;
pub use delivery::{Delivery, DeliveryTag, MessageProperties};
pub use memory::InMemoryBroker;

pub type DeliveryStream = BoxStream<'static, Result<Delivery, BrokerError>>;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("no queue named '{destination}'")]
    Unroutable { destination: String },

    #[error("broker rejected message for '{destination}'")]
    Rejected { destination: String },

    #[error("unknown delivery tag {0}")]
    UnknownDeliveryTag(u64),

    #[error("consumer stream closed")]
    ConsumerClosed,

    #[error("broker connection is closed")]
    Closed,
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError::Channel(err.to_string())
    }
}

#[async_trait]
pub trait BrokerChannel: Send + Sync {
    /// Publishes `payload` to the queue named `destination` via the default
    /// exchange.
    async fn publish(
        &self,
        destination: &str,
        payload: &[u8],
        properties: &MessageProperties,
    ) -> Result<(), BrokerError>;

    /// Positively acknowledges a delivery, removing it from its queue.
    async fn ack(&self, tag: DeliveryTag) -> Result<(), BrokerError>;

    /// Rejects a delivery, optionally putting it back on its queue.
    async fn nack(&self, tag: DeliveryTag, requeue: bool) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait BrokerClient: BrokerChannel {
    /// Declares a durable queue that survives a broker restart.
    async fn declare_queue(&self, name: &str) -> Result<(), BrokerError>;

    /// Declares a server-named, exclusive, auto-delete queue for replies and
    /// returns its name.
    async fn declare_reply_queue(&self) -> Result<String, BrokerError>;

    /// Caps how many unacknowledged deliveries each subsequent consumer holds.
    async fn set_prefetch(&self, count: u16) -> Result<(), BrokerError>;

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, BrokerError>;

    async fn close(&self) -> Result<(), BrokerError>;
}
