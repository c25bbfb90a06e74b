use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{Delivery, MessageBus, QueueError};
use crate::error::ProcessingError;

const READ_ERROR_PAUSE: Duration = Duration::from_secs(1);

#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one delivery. Long-running work must be spawned, not awaited.
    async fn handle(&self, delivery: &Delivery) -> Result<(), ProcessingError>;
}

/// Sequential consumption loop for one topic.
///
/// Handler errors are logged and the message acknowledged. Transient errors
/// leave the transaction as it was, so a redelivery or retry can advance it.
/// Read errors are logged and retried after a pause. Returns once the
/// subscription closes.
pub async fn run_consumer(
    bus: Arc<dyn MessageBus>,
    topic: &str,
    group: &str,
    handler: Arc<dyn MessageHandler>,
) -> Result<(), QueueError> {
    let mut subscription = bus.subscribe(topic, group).await?;
    info!("Consuming {} as group {}", topic, group);

    loop {
        let delivery = match subscription.next().await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read from {}: {}", topic, e);
                tokio::time::sleep(READ_ERROR_PAUSE).await;
                continue;
            }
        };

        match handler.handle(&delivery).await {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                warn!(
                    "Message {} from {} left unprocessed, awaiting redelivery: {}",
                    delivery.id, topic, e
                );
            }
            Err(e) => error!("Dropping message {} from {}: {}", delivery.id, topic, e),
        }

        if let Err(e) = subscription.ack(&delivery).await {
            warn!("Failed to ack message {} on {}: {}", delivery.id, topic, e);
        }
    }

    info!("Subscription to {} closed", topic);
    Ok(())
}
