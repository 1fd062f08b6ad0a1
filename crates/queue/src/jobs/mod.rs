//! Job definitions.

mod deliver;

pub use deliver::DeliveryJob;
