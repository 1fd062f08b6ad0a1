//! In-process queue store.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_common::{DeliveryMetrics, get_metrics};
use courier_db::repositories::DEFAULT_CLAIM_LEASE;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use super::{Claim, ClaimedJob, DeliveryQueueStore};
use crate::error::QueueResult;
use crate::jobs::DeliveryJob;

struct Entry {
    job: DeliveryJob,
    lease: Option<(Uuid, Instant)>,
}

impl Entry {
    fn is_waiting(&self, now: Instant) -> bool {
        self.lease.is_none_or(|(_, until)| until <= now)
    }

    fn is_held_by(&self, token: Uuid) -> bool {
        self.lease.is_some_and(|(holder, _)| holder == token)
    }
}

/// Jobs keyed by insertion sequence, so iteration order is FIFO order.
#[derive(Default)]
struct Entries {
    next_seq: i64,
    jobs: BTreeMap<i64, Entry>,
}

impl Entries {
    fn push(&mut self, job: DeliveryJob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.jobs.insert(seq, Entry { job, lease: None });
    }

    fn remove_held(&mut self, claim: Claim) -> Option<Entry> {
        match self.jobs.get(&claim.key()) {
            Some(entry) if entry.is_held_by(claim.token()) => self.jobs.remove(&claim.key()),
            _ => None,
        }
    }
}

/// Queue store held in memory.
///
/// Contents do not survive a restart. Used for tests and for embedding the
/// delivery engine where durability is provided elsewhere.
#[derive(Clone)]
pub struct MemoryQueueStore {
    entries: Arc<Mutex<Entries>>,
    lease: Duration,
    metrics: Arc<DeliveryMetrics>,
}

impl Default for MemoryQueueStore {
    fn default() -> Self {
        Self::with_metrics(get_metrics().clone())
    }
}

impl MemoryQueueStore {
    /// Create an empty store reporting to the global metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store that reports to the given metrics.
    #[must_use]
    pub fn with_metrics(metrics: Arc<DeliveryMetrics>) -> Self {
        Self {
            entries: Arc::default(),
            lease: DEFAULT_CLAIM_LEASE,
            metrics,
        }
    }

    /// How long a claimed job stays hidden from other workers.
    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Copy of the waiting jobs, oldest first. Claimed jobs are left out
    /// until their lease expires.
    pub async fn snapshot(&self) -> Vec<DeliveryJob> {
        let now = Instant::now();
        self.entries
            .lock()
            .await
            .jobs
            .values()
            .filter(|entry| entry.is_waiting(now))
            .map(|entry| entry.job.clone())
            .collect()
    }
}

#[async_trait]
impl DeliveryQueueStore for MemoryQueueStore {
    async fn enqueue(
        &self,
        actor_id: &str,
        body: &str,
        addresses: &[String],
        signing_key: &str,
    ) -> QueueResult<usize> {
        if addresses.is_empty() {
            return Ok(0);
        }

        let mut entries = self.entries.lock().await;
        for address in addresses {
            entries.push(DeliveryJob::new(actor_id, address.as_str(), body, signing_key));
        }
        drop(entries);

        self.metrics.record_enqueue(addresses.len() as u64, 0);
        Ok(addresses.len())
    }

    async fn dequeue_one(&self) -> QueueResult<Option<ClaimedJob>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let Some((&key, entry)) = entries
            .jobs
            .iter_mut()
            .find(|(_, entry)| entry.is_waiting(now))
        else {
            return Ok(None);
        };

        let token = Uuid::new_v4();
        entry.lease = Some((token, now + self.lease));
        Ok(Some(ClaimedJob {
            claim: Claim::new(key, token),
            job: entry.job.clone(),
        }))
    }

    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<bool> {
        Ok(self
            .entries
            .lock()
            .await
            .remove_held(claimed.claim)
            .is_some())
    }

    async fn requeue(&self, claimed: &ClaimedJob) -> QueueResult<Option<DeliveryJob>> {
        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.remove_held(claimed.claim) else {
            return Ok(None);
        };

        let job = entry.job.into_retry();
        entries.push(job.clone());
        drop(entries);

        self.metrics.record_requeue();
        Ok(Some(job))
    }

    async fn pending_count(&self) -> QueueResult<u64> {
        Ok(self.entries.lock().await.jobs.len() as u64)
    }
}
