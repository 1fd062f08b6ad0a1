//! `PostgreSQL` queue store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_common::{DeliveryMetrics, get_metrics};
use courier_db::entities::delivery_job;
use courier_db::repositories::{DeliveryQueueRepository, NewDelivery};
use sea_orm::DatabaseConnection;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Claim, ClaimedJob, DeliveryQueueStore};
use crate::error::QueueResult;
use crate::jobs::DeliveryJob;

/// Queue store backed by the `delivery_queue` table.
///
/// The table's `BIGSERIAL` id is the FIFO ordering key. Jobs survive process
/// restarts, including jobs that were claimed but never resolved.
#[derive(Clone)]
pub struct DatabaseQueueStore {
    repo: DeliveryQueueRepository,
    metrics: Arc<DeliveryMetrics>,
}

impl DatabaseQueueStore {
    /// Create a store over an existing connection.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self::from_repository(DeliveryQueueRepository::new(db))
    }

    /// Create a store over an existing repository.
    #[must_use]
    pub fn from_repository(repo: DeliveryQueueRepository) -> Self {
        Self {
            repo,
            metrics: get_metrics().clone(),
        }
    }

    /// How long a claimed job stays hidden from other workers. Should exceed
    /// the longest delivery attempt.
    #[must_use]
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.repo = self.repo.with_lease(lease);
        self
    }

    /// Report to the given metrics instead of the global ones.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<DeliveryMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// The oldest `limit` unresolved jobs, without claiming them.
    pub async fn peek(&self, limit: u64) -> QueueResult<Vec<DeliveryJob>> {
        let rows = self.repo.list_oldest(limit).await?;
        Ok(rows.into_iter().map(job_from_row).collect())
    }
}

fn job_from_row(row: delivery_job::Model) -> DeliveryJob {
    DeliveryJob {
        actor_id: row.actor_id,
        address: row.address,
        body: row.body,
        signing_key: row.signing_key,
        attempt: u32::try_from(row.attempt).unwrap_or_default(),
    }
}

fn row_from_job(job: DeliveryJob) -> NewDelivery {
    NewDelivery {
        actor_id: job.actor_id,
        address: job.address,
        body: job.body,
        signing_key: job.signing_key,
        attempt: i32::try_from(job.attempt).unwrap_or(i32::MAX),
    }
}

#[async_trait]
impl DeliveryQueueStore for DatabaseQueueStore {
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

        let rows = addresses
            .iter()
            .map(|address| row_from_job(DeliveryJob::new(actor_id, address.as_str(), body, signing_key)))
            .collect();

        let result = self.repo.insert_batch(rows).await.inspect_err(|_| {
            self.metrics.record_enqueue(0, addresses.len() as u64);
        })?;
        self.metrics.record_enqueue(result.inserted, result.failed);

        if result.failed > 0 {
            // TODO: retry individually failed rows instead of dropping them
            warn!(
                actor_id = %actor_id,
                persisted = result.inserted,
                failed = result.failed,
                "Some deliveries could not be queued"
            );
        }

        Ok(usize::try_from(result.inserted).unwrap_or(usize::MAX))
    }

    async fn dequeue_one(&self) -> QueueResult<Option<ClaimedJob>> {
        let token = Uuid::new_v4();
        Ok(self.repo.claim_oldest(token).await?.map(|row| ClaimedJob {
            claim: Claim::new(row.id, token),
            job: job_from_row(row),
        }))
    }

    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<bool> {
        let claim = claimed.claim;
        Ok(self.repo.delete_claimed(claim.key(), claim.token()).await?)
    }

    async fn requeue(&self, claimed: &ClaimedJob) -> QueueResult<Option<DeliveryJob>> {
        let claim = claimed.claim;
        let job = claimed.job.clone().into_retry();
        let Some(row) = self
            .repo
            .requeue_claimed(claim.key(), claim.token(), row_from_job(job.clone()))
            .await?
        else {
            return Ok(None);
        };

        self.metrics.record_requeue();
        debug!(id = row.id, address = %job.address, attempt = job.attempt, "Requeued delivery");
        Ok(Some(job))
    }

    async fn pending_count(&self) -> QueueResult<u64> {
        Ok(self.repo.count().await?)
    }
}
