//! Ordered, at-least-once publish/subscribe used between pipeline stages.

pub mod consumer;
pub mod memory;
pub mod redis_stream;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

pub use consumer::{run_consumer, MessageHandler};
pub use memory::InMemoryBus;
pub use redis_stream::RedisStreamBus;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue backend error: {0}")]
    Backend(String),

    #[error("Failed to encode message: {0}")]
    Encode(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(e: redis::RedisError) -> Self {
        QueueError::Backend(e.to_string())
    }
}

/// One message read from a topic. `id` is backend-assigned and used for acks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub topic: String,
    pub id: String,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Joins `group` on `topic`. Members of one group share the stream.
    async fn subscribe(&self, topic: &str, group: &str)
        -> Result<Box<dyn Subscription>, QueueError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next delivery, or `None` once the subscription is closed.
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError>;
}

pub async fn publish_json<T>(bus: &dyn MessageBus, topic: &str, value: &T) -> Result<(), QueueError>
where
    T: Serialize + Sync + ?Sized,
{
    let payload = serde_json::to_vec(value).map_err(|e| QueueError::Encode(e.to_string()))?;
    bus.publish(topic, &payload).await
}
