//! Long-running worker tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::deliver::DeliveryWorker;

/// Wakes idle workers when there may be work.
///
/// Firing while every worker is busy is not lost: the next worker to go idle
/// starts another pass straight away.
#[derive(Debug, Clone, Default)]
pub struct DeliveryTrigger {
    notify: Arc<Notify>,
}

impl DeliveryTrigger {
    /// Create a trigger with no pending signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake one idle worker.
    pub fn fire(&self) {
        self.notify.notify_one();
    }

    /// Wait until fired.
    pub async fn wait(&self) {
        self.notify.notified().await;
    }
}

/// A fixed set of [`DeliveryWorker`] tasks sharing one trigger.
pub struct DeliveryWorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl DeliveryWorkerPool {
    /// Spawn `workers` drain tasks (at least one) and start a first pass to
    /// pick up jobs left from a previous run.
    ///
    /// If `sweep_interval` is non-zero, the trigger is also fired on that
    /// interval so a pass that stopped on a store error is retried.
    pub fn spawn(
        workers: usize,
        worker: DeliveryWorker,
        trigger: DeliveryTrigger,
        sweep_interval: Duration,
    ) -> Self {
        let cancel = CancellationToken::new();
        let workers = workers.max(1);
        let mut handles = Vec::with_capacity(workers + 1);

        for id in 0..workers {
            handles.push(tokio::spawn(run_worker(
                id,
                worker.clone(),
                trigger.clone(),
                cancel.clone(),
            )));
        }

        if !sweep_interval.is_zero() {
            handles.push(tokio::spawn(run_sweeper(
                trigger.clone(),
                sweep_interval,
                cancel.clone(),
            )));
        }

        trigger.fire();
        info!(workers, "Delivery workers started");

        Self { cancel, handles }
    }

    /// Token that stops the pool when cancelled.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop all workers and wait for them to exit.
    ///
    /// A worker in the middle of a delivery finishes resolving that job
    /// first.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Delivery worker task failed");
            }
        }
        info!("Delivery workers stopped");
    }
}

async fn run_worker(
    id: usize,
    worker: DeliveryWorker,
    trigger: DeliveryTrigger,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = trigger.wait() => {}
        }

        match worker.drain_with(&cancel, Some(&trigger)).await {
            Ok(stats) if stats.processed() > 0 => {
                debug!(
                    worker = id,
                    delivered = stats.delivered,
                    rejected = stats.permanent_failures,
                    requeued = stats.requeued,
                    dead_lettered = stats.dead_lettered,
                    "Drain pass finished"
                );
            }
            Ok(_) => {}
            Err(e) => {
                error!(worker = id, error = %e, "Drain pass stopped on store error");
            }
        }
    }
}

async fn run_sweeper(trigger: DeliveryTrigger, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => trigger.fire(),
        }
    }
}
