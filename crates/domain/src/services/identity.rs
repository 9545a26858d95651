//! Identity provider trait and implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::ActorId;
use store::{PostgresStore, StoreError};

use crate::error::{DomainError, Result};

/// Resolves authenticated actors to the names recorded in the history log.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns the actor's display name, or `None` for an unknown actor.
    async fn display_name(&self, actor: ActorId) -> Result<Option<String>>;

    /// Like [`display_name`](Self::display_name), but an unknown actor is
    /// `Unauthorized`.
    async fn require_name(&self, actor: ActorId) -> Result<String> {
        self.display_name(actor)
            .await?
            .ok_or(DomainError::Unauthorized)
    }
}

/// In-memory identity provider for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityProvider {
    users: Arc<RwLock<HashMap<ActorId, String>>>,
}

impl InMemoryIdentityProvider {
    /// Creates a new in-memory identity provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user.
    pub fn with_user(self, actor: ActorId, name: impl Into<String>) -> Self {
        self.insert(actor, name);
        self
    }

    /// Registers a user.
    pub fn insert(&self, actor: ActorId, name: impl Into<String>) {
        super::write(&self.users).insert(actor, name.into());
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn display_name(&self, actor: ActorId) -> Result<Option<String>> {
        Ok(super::read(&self.users).get(&actor).cloned())
    }
}

#[async_trait]
impl IdentityProvider for PostgresStore {
    async fn display_name(&self, actor: ActorId) -> Result<Option<String>> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM users WHERE id = $1")
            .bind(actor.as_i64())
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::from)?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test]
    async fn known_actor_has_a_name() {
        let identity = InMemoryIdentityProvider::new().with_user(ActorId::new(1), "alice");
        assert_eq!(
            identity.display_name(ActorId::new(1)).await.unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(identity.require_name(ActorId::new(1)).await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn unknown_actor_is_unauthorized() {
        let identity = InMemoryIdentityProvider::new();
        assert_eq!(identity.display_name(ActorId::new(2)).await.unwrap(), None);
        let err = identity.require_name(ActorId::new(2)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
