//! Database entities.

#![allow(missing_docs)]

pub mod actor_keypair;
pub mod delivery_job;

pub use actor_keypair::Entity as ActorKeypair;
pub use delivery_job::Entity as DeliveryJob;
