//! Durable FIFO storage for delivery jobs.
//!
//! The store is the only state shared between workers. A worker claims the
//! oldest waiting job, which hides it from other workers for a lease period
//! without removing it, and then resolves the claim by completing or
//! requeueing it. A claim that is never resolved, because the worker crashed
//! or its store calls kept failing, expires and the job is handed out again.

mod database;
mod memory;

pub use database::DatabaseQueueStore;
pub use memory::MemoryQueueStore;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueResult;
use crate::jobs::DeliveryJob;

/// Identifies one lease on one stored job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Claim {
    key: i64,
    token: Uuid,
}

impl Claim {
    /// Create a claim on the entry stored under `key`.
    #[must_use]
    pub const fn new(key: i64, token: Uuid) -> Self {
        Self { key, token }
    }

    /// Storage key of the claimed entry.
    #[must_use]
    pub const fn key(&self) -> i64 {
        self.key
    }

    /// Token identifying this lease.
    #[must_use]
    pub const fn token(&self) -> Uuid {
        self.token
    }
}

/// A job handed to a worker, together with its claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    /// The lease on the stored entry.
    pub claim: Claim,
    /// The job to deliver.
    pub job: DeliveryJob,
}

/// Storage backend for the delivery queue.
#[async_trait]
pub trait DeliveryQueueStore: Send + Sync {
    /// Append one job per address, each at attempt 0, in address order.
    ///
    /// Does nothing when `addresses` is empty. Persistence is best-effort per
    /// job: a job that cannot be written is logged and counted but does not
    /// prevent the others from being stored, and is not reported back to the
    /// caller. Returns the number of jobs persisted; fails only when the
    /// store could not take any of them.
    async fn enqueue(
        &self,
        actor_id: &str,
        body: &str,
        addresses: &[String],
        signing_key: &str,
    ) -> QueueResult<usize>;

    /// Claim the oldest waiting job.
    ///
    /// Two concurrent calls never return the same job. The job stays stored
    /// until the claim is resolved with [`complete`](Self::complete) or
    /// [`requeue`](Self::requeue), and becomes waiting again if the lease
    /// runs out first.
    async fn dequeue_one(&self) -> QueueResult<Option<ClaimedJob>>;

    /// Remove a job whose delivery is resolved.
    ///
    /// Returns `false` if the lease had already expired and the job was
    /// claimed by someone else, in which case nothing is removed.
    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<bool>;

    /// Replace a claimed job with a copy whose attempt counter is incremented
    /// by one, appended as the newest entry.
    ///
    /// Returns the job as stored, or `None` if the lease had been lost, in
    /// which case nothing changes.
    async fn requeue(&self, claimed: &ClaimedJob) -> QueueResult<Option<DeliveryJob>>;

    /// Number of unresolved jobs, waiting or claimed.
    async fn pending_count(&self) -> QueueResult<u64>;
}
