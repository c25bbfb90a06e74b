use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::{Delivery, MessageBus, QueueError, Subscription};

#[derive(Default)]
struct Inner {
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<Delivery>>>,
    published: Vec<(String, Vec<u8>)>,
    closed: bool,
}

/// In-process bus: every message goes to every live subscription of its topic.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    inner: Arc<Mutex<Inner>>,
    sequence: Arc<AtomicU64>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published to `topic`, oldest first.
    pub fn published(&self, topic: &str) -> Vec<Vec<u8>> {
        self.lock()
            .published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn published_count(&self, topic: &str) -> usize {
        self.lock().published.iter().filter(|(t, _)| t == topic).count()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().subscribers.get(topic).map_or(0, Vec::len)
    }

    /// Ends every subscription once its buffered messages are drained.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.subscribers.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), QueueError> {
        let id = self.sequence.fetch_add(1, Ordering::SeqCst).to_string();
        let mut inner = self.lock();
        if inner.closed {
            return Err(QueueError::Backend("bus is closed".to_string()));
        }

        inner.published.push((topic.to_string(), payload.to_vec()));
        if let Some(senders) = inner.subscribers.get_mut(topic) {
            let delivery = Delivery {
                topic: topic.to_string(),
                id,
                payload: payload.to_vec(),
            };
            senders.retain(|tx| tx.send(delivery.clone()).is_ok());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        _group: &str,
    ) -> Result<Box<dyn Subscription>, QueueError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if inner.closed {
            return Err(QueueError::Backend("bus is closed".to_string()));
        }
        inner
            .subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);

        Ok(Box::new(MemorySubscription { receiver: rx }))
    }
}

struct MemorySubscription {
    receiver: mpsc::UnboundedReceiver<Delivery>,
}

#[async_trait]
impl Subscription for MemorySubscription {
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError> {
        Ok(self.receiver.recv().await)
    }

    async fn ack(&mut self, _delivery: &Delivery) -> Result<(), QueueError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_to_all_subscribers() {
        let bus = InMemoryBus::new();
        let mut first = bus.subscribe("transactions", "processor").await.unwrap();
        let mut second = bus.subscribe("transactions", "audit").await.unwrap();

        bus.publish("transactions", b"t1").await.unwrap();

        assert_eq!(first.next().await.unwrap().unwrap().payload, b"t1");
        assert_eq!(second.next().await.unwrap().unwrap().payload, b"t1");
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let bus = InMemoryBus::new();
        let mut callbacks = bus.subscribe("callbacks", "correlator").await.unwrap();

        bus.publish("transactions", b"t1").await.unwrap();
        bus.publish("callbacks", b"cb1").await.unwrap();

        let delivery = callbacks.next().await.unwrap().unwrap();
        assert_eq!(delivery.topic, "callbacks");
        assert_eq!(delivery.payload, b"cb1");
        assert_eq!(bus.published_count("transactions"), 1);
        assert_eq!(bus.published("callbacks"), vec![b"cb1".to_vec()]);
    }

    #[tokio::test]
    async fn test_close_ends_subscription() {
        let bus = InMemoryBus::new();
        let mut sub = bus.subscribe("dispatch", "dispatcher").await.unwrap();

        bus.publish("dispatch", b"t1").await.unwrap();
        bus.close();

        assert!(sub.next().await.unwrap().is_some());
        assert!(sub.next().await.unwrap().is_none());
        assert!(bus.publish("dispatch", b"t2").await.is_err());
    }
}
