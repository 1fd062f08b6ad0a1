//! Entry point for sending a message to a set of inboxes.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use crate::body::serialize_public;
use crate::error::QueueResult;
use crate::keys::SigningKeySource;
use crate::store::DeliveryQueueStore;
use crate::workers::DeliveryTrigger;

/// Turns a message and its recipients into queued jobs and wakes the
/// workers.
#[derive(Clone)]
pub struct DeliveryCoordinator {
    store: Arc<dyn DeliveryQueueStore>,
    keys: Arc<dyn SigningKeySource>,
    trigger: DeliveryTrigger,
}

impl DeliveryCoordinator {
    /// Create a coordinator that wakes workers through `trigger`.
    pub fn new(
        store: Arc<dyn DeliveryQueueStore>,
        keys: Arc<dyn SigningKeySource>,
        trigger: DeliveryTrigger,
    ) -> Self {
        Self {
            store,
            keys,
            trigger,
        }
    }

    /// Queue `message` from `actor_id` for delivery to every address.
    ///
    /// The message is serialized once, without its private fields, and the
    /// sender's current key is captured, so every job carries identical
    /// bytes and credentials. Returns once the jobs are stored; delivery
    /// happens in the background. Fails if the key cannot be fetched, the
    /// message cannot be serialized, or no job could be stored.
    pub async fn queue_for_delivery(
        &self,
        actor_id: &str,
        message: &Value,
        addresses: &[String],
    ) -> QueueResult<()> {
        if addresses.is_empty() {
            debug!(actor_id = %actor_id, "No recipients, nothing to queue");
            self.trigger.fire();
            return Ok(());
        }

        let signing_key = self.keys.fetch_signing_key(actor_id).await?;
        let body = serialize_public(message)?;

        let queued = self
            .store
            .enqueue(actor_id, &body, addresses, &signing_key)
            .await?;

        info!(
            actor_id = %actor_id,
            recipients = addresses.len(),
            queued,
            "Queued message for delivery"
        );

        self.trigger.fire();
        Ok(())
    }
}
