//! Delivery queue entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One pending delivery of a message to a single remote inbox.
///
/// `id` is a `BIGSERIAL` and only defines FIFO order. A row stays in the
/// table while a worker delivers it, leased through `claimed_until`, and is
/// deleted once the delivery is resolved.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "delivery_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Local actor the message is sent as
    pub actor_id: String,

    /// Remote inbox URL
    #[sea_orm(column_type = "Text")]
    pub address: String,

    /// Serialized message, byte-identical across retries
    #[sea_orm(column_type = "Text")]
    pub body: String,

    /// Actor private key (PEM) captured at enqueue time
    #[sea_orm(column_type = "Text")]
    pub signing_key: String,

    /// Number of times the job has been requeued
    pub attempt: i32,

    /// Lease expiry while a worker holds the row, `None` when waiting
    pub claimed_until: Option<DateTimeWithTimeZone>,

    /// Identifies the current holder of the lease
    pub claim_token: Option<Uuid>,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
