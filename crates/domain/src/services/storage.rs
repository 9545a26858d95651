//! Object storage URL signing.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{DomainError, Result};

/// Issues time-limited URLs for stored objects.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Returns a URL that grants read access to `key` for `ttl`.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String>;
}

/// Builds URLs under a fixed base without contacting a storage service.
#[derive(Debug, Clone)]
pub struct StaticObjectStorage {
    base_url: String,
}

impl StaticObjectStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl Default for StaticObjectStorage {
    fn default() -> Self {
        Self::new("http://localhost/objects")
    }
}

#[async_trait]
impl ObjectStorage for StaticObjectStorage {
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String> {
        let key = key.trim_start_matches('/');
        if key.is_empty() {
            return Err(DomainError::bad_request("image_keys", "empty object key"));
        }
        Ok(format!("{}/{}?expires_in={}", self.base_url, key, ttl.as_secs()))
    }
}
