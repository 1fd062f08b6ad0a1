//! Reporting of deliveries that will never succeed.

use tracing::warn;

use crate::jobs::DeliveryJob;
use crate::retry::DeadLetterEntry;

/// Receives the jobs the worker gives up on.
///
/// Called inline from the drain loop, so implementations should return
/// quickly.
pub trait DeliveryObserver: Send + Sync {
    /// The remote rejected the job, or it could not be signed or addressed.
    fn on_permanent_failure(&self, job: &DeliveryJob, status: Option<u16>, reason: &str);

    /// The job ran out of attempts.
    fn on_dead_letter(&self, entry: &DeadLetterEntry<DeliveryJob>);
}

/// Writes dropped jobs to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl DeliveryObserver for TracingObserver {
    fn on_permanent_failure(&self, job: &DeliveryJob, status: Option<u16>, reason: &str) {
        warn!(
            target: "courier::delivery",
            actor_id = %job.actor_id,
            address = %job.address,
            attempt = job.attempt,
            status = ?status,
            reason = %reason,
            "Delivery rejected, not retrying"
        );
    }

    fn on_dead_letter(&self, entry: &DeadLetterEntry<DeliveryJob>) {
        warn!(
            target: "courier::delivery",
            actor_id = %entry.job.actor_id,
            address = %entry.job.address,
            attempts = entry.attempts,
            last_error = %entry.last_error,
            failed_at = %entry.failed_at,
            "Delivery abandoned after exhausting attempts"
        );
    }
}
