//! Lookup of actor signing keys.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_common::AppError;
use courier_db::repositories::ActorKeypairRepository;
use sea_orm::DatabaseConnection;

use crate::error::{QueueError, QueueResult};

/// Source of the private key an actor signs its deliveries with.
#[async_trait]
pub trait SigningKeySource: Send + Sync {
    /// Fetch the PEM encoded private key for `actor_id`.
    ///
    /// Fails with [`QueueError::SigningKey`] when the actor has no key.
    async fn fetch_signing_key(&self, actor_id: &str) -> QueueResult<String>;
}

/// Reads keys from the `actor_keypair` table.
#[derive(Clone)]
pub struct DatabaseKeySource {
    repo: ActorKeypairRepository,
}

impl DatabaseKeySource {
    /// Create a key source over an existing connection.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            repo: ActorKeypairRepository::new(db),
        }
    }
}

#[async_trait]
impl SigningKeySource for DatabaseKeySource {
    async fn fetch_signing_key(&self, actor_id: &str) -> QueueResult<String> {
        match self.repo.get_by_actor_id(actor_id).await {
            Ok(keypair) if keypair.private_key.trim().is_empty() => Err(QueueError::SigningKey {
                actor_id: actor_id.to_string(),
                reason: "stored private key is empty".to_string(),
            }),
            Ok(keypair) => Ok(keypair.private_key),
            Err(AppError::NotFound(reason)) => Err(QueueError::SigningKey {
                actor_id: actor_id.to_string(),
                reason,
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Fixed set of keys held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticKeySource {
    keys: HashMap<String, String>,
}

impl StaticKeySource {
    /// Create an empty key source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the key for an actor.
    #[must_use]
    pub fn with_key(mut self, actor_id: impl Into<String>, private_key_pem: impl Into<String>) -> Self {
        self.keys.insert(actor_id.into(), private_key_pem.into());
        self
    }
}

#[async_trait]
impl SigningKeySource for StaticKeySource {
    async fn fetch_signing_key(&self, actor_id: &str) -> QueueResult<String> {
        self.keys
            .get(actor_id)
            .cloned()
            .ok_or_else(|| QueueError::SigningKey {
                actor_id: actor_id.to_string(),
                reason: "no key registered".to_string(),
            })
    }
}
