//! Actor keypair entity (RSA keys for HTTP Signatures).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Signing keys of a local actor. Each local actor has exactly one keypair.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "actor_keypair")]
pub struct Model {
    /// The actor's id (URL)
    #[sea_orm(primary_key, auto_increment = false)]
    pub actor_id: String,

    /// RSA public key (PEM format)
    #[sea_orm(column_type = "Text")]
    pub public_key: String,

    /// RSA private key (PEM format)
    #[sea_orm(column_type = "Text")]
    pub private_key: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
