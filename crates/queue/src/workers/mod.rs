//! Delivery workers.

mod deliver;
mod pool;

pub use deliver::{DeliveryWorker, DrainStats, REQUEUE_BACKOFF};
pub use pool::{DeliveryTrigger, DeliveryWorkerPool};
