//! Error types for the delivery queue.

use courier_common::AppError;
use thiserror::Error;

/// Result type for queue operations.
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors surfaced by the queue store and by [`crate::DeliveryCoordinator`].
///
/// Delivery failures are not errors: they are reported as
/// [`crate::DeliveryOutcome`] values and handled by the worker.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue store could not be read or written.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The sending actor has no usable signing key.
    #[error("No signing key for actor {actor_id}: {reason}")]
    SigningKey { actor_id: String, reason: String },

    /// The message could not be serialized.
    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<AppError> for QueueError {
    fn from(err: AppError) -> Self {
        Self::Persistence(err.to_string())
    }
}
