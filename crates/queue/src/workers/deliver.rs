//! Drain loop for the delivery queue.

use std::sync::Arc;
use std::time::Duration;

use courier_common::{DeliveryMetrics, Timer, get_metrics};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::pool::DeliveryTrigger;
use crate::error::QueueResult;
use crate::jobs::DeliveryJob;
use crate::report::{DeliveryObserver, TracingObserver};
use crate::retry::{DeadLetterEntry, RetryPolicy};
use crate::store::{ClaimedJob, DeliveryQueueStore};
use crate::transport::{DeliveryOutcome, DeliveryTransport};

/// Pauses between attempts to requeue a job when the store fails.
pub const REQUEUE_BACKOFF: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_secs(2),
];

/// Counts of what one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Jobs the remote accepted.
    pub delivered: u64,
    /// Jobs dropped on a final rejection.
    pub permanent_failures: u64,
    /// Jobs put back at the tail.
    pub requeued: u64,
    /// Jobs dropped at the attempt ceiling.
    pub dead_lettered: u64,
}

impl DrainStats {
    /// Jobs taken off the queue during the pass.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.delivered + self.permanent_failures + self.requeued + self.dead_lettered
    }
}

/// Takes jobs off the queue one at a time and delivers them.
///
/// A worker holds no state between jobs. Any number of them may drain the
/// same store concurrently.
#[derive(Clone)]
pub struct DeliveryWorker {
    store: Arc<dyn DeliveryQueueStore>,
    transport: Arc<dyn DeliveryTransport>,
    policy: RetryPolicy,
    observer: Arc<dyn DeliveryObserver>,
    metrics: Arc<DeliveryMetrics>,
    requeue_backoff: Vec<Duration>,
}

impl DeliveryWorker {
    /// Create a worker that retries without limit and logs dropped jobs.
    pub fn new(store: Arc<dyn DeliveryQueueStore>, transport: Arc<dyn DeliveryTransport>) -> Self {
        Self {
            store,
            transport,
            policy: RetryPolicy::default(),
            observer: Arc::new(TracingObserver),
            metrics: get_metrics().clone(),
            requeue_backoff: REQUEUE_BACKOFF.to_vec(),
        }
    }

    /// Use the given retry policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Report dropped jobs to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Record to the given metrics instead of the global ones.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<DeliveryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Pauses between retries of a failed requeue, one retry per entry.
    #[must_use]
    pub fn with_requeue_backoff(mut self, delays: impl IntoIterator<Item = Duration>) -> Self {
        self.requeue_backoff = delays.into_iter().collect();
        self
    }

    /// Process jobs until the queue is empty.
    ///
    /// Every job claimed from the queue is resolved (delivered, dropped or
    /// put back) before the next one is claimed. A store error ends the pass.
    /// The job being processed stays claimed and is handed out again once
    /// its lease expires. Jobs still queued are left for the next pass.
    pub async fn drain(&self) -> QueueResult<DrainStats> {
        self.drain_with(&CancellationToken::new(), None).await
    }

    /// Like [`drain`](Self::drain), but also stops between jobs once `cancel`
    /// fires. When `peers` is given and the pass finds work, it is fired once
    /// so another idle worker joins in.
    pub async fn drain_with(
        &self,
        cancel: &CancellationToken,
        peers: Option<&DeliveryTrigger>,
    ) -> QueueResult<DrainStats> {
        let mut stats = DrainStats::default();
        let mut woke_peer = false;

        while !cancel.is_cancelled() {
            let Some(claimed) = self.store.dequeue_one().await? else {
                break;
            };

            if !woke_peer {
                if let Some(peers) = peers {
                    peers.fire();
                }
                woke_peer = true;
            }

            self.process(claimed, &mut stats).await?;
        }

        Ok(stats)
    }

    async fn process(&self, claimed: ClaimedJob, stats: &mut DrainStats) -> QueueResult<()> {
        let job = &claimed.job;
        debug!(
            actor_id = %job.actor_id,
            address = %job.address,
            attempt = job.attempt,
            "Delivering message"
        );

        let timer = Timer::start();
        let outcome = self
            .transport
            .deliver(&job.actor_id, &job.body, &job.address, &job.signing_key)
            .await;
        let elapsed = timer.elapsed();

        match outcome {
            DeliveryOutcome::Success { status } => {
                self.metrics.record_success(elapsed);
                self.complete(&claimed).await?;
                stats.delivered += 1;
                info!(
                    address = %job.address,
                    status,
                    attempt = job.attempt,
                    "Message delivered"
                );
            }
            DeliveryOutcome::PermanentFailure { status, reason } => {
                self.metrics.record_permanent_failure(elapsed);
                self.complete(&claimed).await?;
                stats.permanent_failures += 1;
                self.observer.on_permanent_failure(job, status, &reason);
            }
            DeliveryOutcome::TransientFailure { status, reason } => {
                self.metrics.record_transient_failure(elapsed);

                if self.policy.is_exhausted(job.attempt) {
                    self.complete(&claimed).await?;
                    let attempts = job.attempt.saturating_add(1);
                    let entry = DeadLetterEntry::new(job.clone(), attempts, reason);
                    self.metrics.record_dead_letter();
                    stats.dead_lettered += 1;
                    self.observer.on_dead_letter(&entry);
                    return Ok(());
                }

                if self.policy.should_report(job.attempt) {
                    warn!(
                        target: "courier::delivery",
                        actor_id = %job.actor_id,
                        address = %job.address,
                        attempt = job.attempt,
                        status = ?status,
                        reason = %reason,
                        "Delivery keeps failing, requeueing"
                    );
                } else {
                    debug!(
                        address = %job.address,
                        attempt = job.attempt,
                        status = ?status,
                        reason = %reason,
                        "Delivery failed, requeueing"
                    );
                }

                match self.requeue_with_backoff(&claimed).await {
                    Ok(Some(_)) => stats.requeued += 1,
                    Ok(None) => {
                        warn!(
                            address = %job.address,
                            attempt = job.attempt,
                            "Lease expired before requeue, delivery left to its new holder"
                        );
                    }
                    Err(e) => {
                        error!(
                            actor_id = %job.actor_id,
                            address = %job.address,
                            attempt = job.attempt,
                            error = %e,
                            "Failed to requeue delivery, it stays claimed until its lease expires"
                        );
                        return Err(e);
                    }
                }
            }
        }

        Ok(())
    }

    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        if !self.store.complete(claimed).await? {
            debug!(
                address = %claimed.job.address,
                "Lease expired before the delivery was resolved"
            );
        }
        Ok(())
    }

    async fn requeue_with_backoff(&self, claimed: &ClaimedJob) -> QueueResult<Option<DeliveryJob>> {
        let mut delays = self.requeue_backoff.iter();
        loop {
            match self.store.requeue(claimed).await {
                Ok(stored) => return Ok(stored),
                Err(e) => {
                    let Some(delay) = delays.next() else {
                        return Err(e);
                    };
                    warn!(
                        address = %claimed.job.address,
                        error = %e,
                        retry_in_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "Failed to requeue delivery, retrying"
                    );
                    tokio::time::sleep(*delay).await;
                }
            }
        }
    }
}
