//! Outbound delivery job.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One delivery of a message to a single remote inbox.
///
/// Everything needed to sign and send the request is captured when the job is
/// enqueued, so a later key rotation or message edit does not change what a
/// retry sends.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    /// The actor sending the message.
    pub actor_id: String,

    /// Target inbox URL.
    pub address: String,

    /// Serialized message, resent byte for byte on every attempt.
    pub body: String,

    /// Actor private key (PEM) captured at enqueue time.
    pub signing_key: String,

    /// Number of times this job has been requeued.
    pub attempt: u32,
}

impl DeliveryJob {
    /// Create a job for its first attempt.
    #[must_use]
    pub fn new(
        actor_id: impl Into<String>,
        address: impl Into<String>,
        body: impl Into<String>,
        signing_key: impl Into<String>,
    ) -> Self {
        Self {
            actor_id: actor_id.into(),
            address: address.into(),
            body: body.into(),
            signing_key: signing_key.into(),
            attempt: 0,
        }
    }

    /// The same job with its attempt counter advanced by one.
    #[must_use]
    pub fn into_retry(mut self) -> Self {
        self.attempt = self.attempt.saturating_add(1);
        self
    }
}

// Keeps private keys out of logs.
impl fmt::Debug for DeliveryJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryJob")
            .field("actor_id", &self.actor_id)
            .field("address", &self.address)
            .field("body_len", &self.body.len())
            .field("signing_key", &"<redacted>")
            .field("attempt", &self.attempt)
            .finish()
    }
}
