//! Outbound delivery queue for courier.
//!
//! Messages addressed to remote inboxes are turned into one job per inbox
//! and stored in a FIFO queue. Workers take jobs off the head, send them as
//! signed HTTP requests and decide what happens next:
//!
//! - **Success** (2xx/3xx): the job is done
//! - **Permanent failure** (4xx, unusable key or address): the job is dropped
//!   and reported
//! - **Transient failure** (5xx, no response): the job goes back to the tail
//!   with its attempt counter incremented
//!
//! The pieces:
//!
//! - [`DeliveryCoordinator`]: entry point that enqueues a message
//! - [`DeliveryQueueStore`]: queue storage (`PostgreSQL` or in-memory)
//! - [`DeliveryTransport`]: the signed `POST`
//! - [`DeliveryWorker`] and [`DeliveryWorkerPool`]: the drain loop

pub mod body;
pub mod coordinator;
pub mod error;
pub mod jobs;
pub mod keys;
pub mod report;
pub mod retry;
pub mod store;
pub mod transport;
pub mod workers;

pub use body::serialize_public;
pub use coordinator::DeliveryCoordinator;
pub use error::{QueueError, QueueResult};
pub use jobs::DeliveryJob;
pub use keys::{DatabaseKeySource, SigningKeySource, StaticKeySource};
pub use report::{DeliveryObserver, TracingObserver};
pub use retry::{DeadLetterEntry, RetryPolicy};
pub use store::{Claim, ClaimedJob, DatabaseQueueStore, DeliveryQueueStore, MemoryQueueStore};
pub use transport::{DeliveryOutcome, DeliveryTransport, HttpDeliveryTransport};
pub use workers::{DeliveryTrigger, DeliveryWorker, DeliveryWorkerPool, DrainStats};
