use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use std::collections::VecDeque;

use super::{Delivery, MessageBus, QueueError, Subscription};

const PAYLOAD_FIELD: &str = "payload";
const READ_COUNT: usize = 16;
const BLOCK_MS: usize = 5000;
/// Groups created on first subscribe start from the oldest entry.
const GROUP_START: &str = "0";
const NEW_ENTRIES: &str = ">";

/// Name of one instance inside a consumer group. Stable across restarts so
/// the instance can reclaim what it read but never acknowledged.
pub fn consumer_name(group: &str, instance: &str) -> String {
    format!("{}-{}", group, instance)
}

/// Redis Streams bus. Each topic is a stream and each subscriber group a
/// consumer group, so members of one group split the stream between them.
#[derive(Clone)]
pub struct RedisStreamBus {
    redis_client: redis::Client,
    instance: String,
}

impl RedisStreamBus {
    pub fn new(redis_url: &str, instance: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self {
            redis_client,
            instance: instance.to_string(),
        })
    }
}

#[async_trait]
impl MessageBus for RedisStreamBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), QueueError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let id: String = conn.xadd(topic, "*", &[(PAYLOAD_FIELD, payload)]).await?;
        tracing::debug!("Published {} to {}", id, topic);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Box<dyn Subscription>, QueueError> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;

        let created: redis::RedisResult<()> =
            conn.xgroup_create_mkstream(topic, group, GROUP_START).await;
        if let Err(e) = created {
            if e.code() != Some("BUSYGROUP") {
                return Err(e.into());
            }
        }

        let consumer = consumer_name(group, &self.instance);
        tracing::info!("Consumer {} joined group {} on {}", consumer, group, topic);

        Ok(Box::new(StreamSubscription {
            conn,
            topic: topic.to_string(),
            group: group.to_string(),
            consumer,
            pending_from: Some(GROUP_START.to_string()),
            buffer: VecDeque::new(),
        }))
    }
}

struct StreamSubscription {
    conn: MultiplexedConnection,
    topic: String,
    group: String,
    consumer: String,
    /// Cursor into this consumer's pending list; `None` once it is drained.
    pending_from: Option<String>,
    buffer: VecDeque<Delivery>,
}

impl StreamSubscription {
    async fn fill(&mut self) -> Result<(), QueueError> {
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(READ_COUNT);

        let reply: Option<StreamReadReply> = match self.pending_from.clone() {
            // Pending reads return immediately, so no BLOCK.
            Some(cursor) => {
                self.conn
                    .xread_options(&[&self.topic], &[&cursor], &opts)
                    .await?
            }
            None => {
                self.conn
                    .xread_options(&[&self.topic], &[NEW_ENTRIES], &opts.block(BLOCK_MS))
                    .await?
            }
        };

        let entries: Vec<_> = reply
            .map(|reply| reply.keys)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|key| key.ids)
            .collect();

        if self.pending_from.is_some() {
            match entries.last() {
                Some(last) => self.pending_from = Some(last.id.clone()),
                None => {
                    tracing::info!("Consumer {} drained its pending entries", self.consumer);
                    self.pending_from = None;
                }
            }
        }

        for entry in entries {
            let payload = match entry.map.get(PAYLOAD_FIELD) {
                Some(value) => redis::from_redis_value::<Vec<u8>>(value)?,
                None => {
                    tracing::warn!("Entry {} on {} has no payload", entry.id, self.topic);
                    Vec::new()
                }
            };
            self.buffer.push_back(Delivery {
                topic: self.topic.clone(),
                id: entry.id,
                payload,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Subscription for StreamSubscription {
    async fn next(&mut self) -> Result<Option<Delivery>, QueueError> {
        loop {
            if let Some(delivery) = self.buffer.pop_front() {
                return Ok(Some(delivery));
            }
            self.fill().await?;
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> Result<(), QueueError> {
        let _: i64 = self
            .conn
            .xack(&self.topic, &self.group, &[&delivery.id])
            .await?;
        Ok(())
    }
}
