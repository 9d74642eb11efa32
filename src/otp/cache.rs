//! Pending-code storage.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::time::Duration;
use thiserror::Error;
use tracing::{info_span, Instrument};

use crate::BoxError;

#[derive(Debug, Error)]
#[error("code cache failure")]
pub struct CacheError(#[source] pub BoxError);

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self(Box::new(err))
    }
}

/// Key-value store with per-key expiry. Every operation is a single atomic
/// command against the backend.
#[async_trait]
pub trait CodeCache: Send + Sync {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Redis-backed cache. `ConnectionManager` reconnects on its own and is cheap
/// to clone, so each call works on its own handle.
#[derive(Clone)]
pub struct RedisCodeCache {
    connection: ConnectionManager,
}

impl RedisCodeCache {
    #[must_use]
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

fn command_span(command: &'static str) -> tracing::Span {
    info_span!("cache.command", db.system = "redis", db.operation = command)
}

#[async_trait]
impl CodeCache for RedisCodeCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        // Redis rejects EX 0; anything below a second rounds up.
        let seconds = ttl.as_secs().max(1);
        connection
            .set_ex::<_, _, ()>(key, value, seconds)
            .instrument(command_span("SET"))
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut connection = self.connection.clone();
        let value = connection
            .get::<_, Option<String>>(key)
            .instrument(command_span("GET"))
            .await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(key)
            .instrument(command_span("DEL"))
            .await?;
        Ok(())
    }
}
