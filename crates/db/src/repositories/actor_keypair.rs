//! Actor keypair repository.

use std::sync::Arc;

use chrono::Utc;
use courier_common::{AppError, AppResult};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::entities::{ActorKeypair, actor_keypair};

/// Actor keypair repository for database operations.
#[derive(Clone)]
pub struct ActorKeypairRepository {
    db: Arc<DatabaseConnection>,
}

impl ActorKeypairRepository {
    /// Create a new actor keypair repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a keypair by actor ID.
    pub async fn find_by_actor_id(&self, actor_id: &str) -> AppResult<Option<actor_keypair::Model>> {
        ActorKeypair::find_by_id(actor_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get a keypair by actor ID, returning an error if not found.
    pub async fn get_by_actor_id(&self, actor_id: &str) -> AppResult<actor_keypair::Model> {
        self.find_by_actor_id(actor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Keypair for actor {actor_id} not found")))
    }

    /// Store a keypair for an actor.
    pub async fn create(
        &self,
        actor_id: &str,
        public_key: &str,
        private_key: &str,
    ) -> AppResult<actor_keypair::Model> {
        let now = Utc::now();
        actor_keypair::ActiveModel {
            actor_id: Set(actor_id.to_string()),
            public_key: Set(public_key.to_string()),
            private_key: Set(private_key.to_string()),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Replace an actor's keys. Deliveries already queued keep the key they
    /// were enqueued with.
    pub async fn rotate(
        &self,
        actor_id: &str,
        public_key: &str,
        private_key: &str,
    ) -> AppResult<actor_keypair::Model> {
        let existing = self.get_by_actor_id(actor_id).await?;
        let mut active: actor_keypair::ActiveModel = existing.into();
        active.public_key = Set(public_key.to_string());
        active.private_key = Set(private_key.to_string());
        active.updated_at = Set(Utc::now().into());
        active
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}
