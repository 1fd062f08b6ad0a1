//! Repositories wrapping the database entities.

mod actor_keypair;
mod delivery_queue;

pub use actor_keypair::ActorKeypairRepository;
pub use delivery_queue::{BatchInsert, DEFAULT_CLAIM_LEASE, DeliveryQueueRepository, NewDelivery};
