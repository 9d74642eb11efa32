//! Persistent user records.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::BoxError;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,
    #[error("credential store failure")]
    Backend(#[source] BoxError),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// The four operations the auth flows need from user storage. Each one maps
/// to a single atomic statement.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the id of the user owning `email`, creating the record if it does
    /// not exist yet. Concurrent calls for one new email yield one record.
    async fn get_or_create_user_id_by_email(&self, email: &str) -> Result<String, StoreError>;

    /// Replace the stored refresh-token hash.
    async fn update_refresh_token_hash(&self, user_id: &str, hash: &[u8])
        -> Result<(), StoreError>;

    async fn get_email_by_user_id(&self, user_id: &str) -> Result<String, StoreError>;

    async fn get_refresh_token_hash_by_user_id(&self, user_id: &str)
        -> Result<Vec<u8>, StoreError>;
}

pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str, statement: &'static str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

// Ids come from tokens and query strings; anything that is not a UUID cannot
// name a row.
fn parse_user_id(user_id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(user_id).map_err(|_| StoreError::UserNotFound)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_or_create_user_id_by_email(&self, email: &str) -> Result<String, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let query = "INSERT INTO users (email) VALUES ($1) \
                     ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
                     RETURNING id::text AS id";
        let row = sqlx::query(query)
            .bind(email)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await?;

        Ok(row.try_get("id")?)
    }

    async fn update_refresh_token_hash(
        &self,
        user_id: &str,
        hash: &[u8],
    ) -> Result<(), StoreError> {
        let id = parse_user_id(user_id)?;
        let query = "UPDATE users SET token_hash = $1, updated_at = NOW() WHERE id = $2";
        let result = sqlx::query(query)
            .bind(hash)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UserNotFound);
        }
        Ok(())
    }

    async fn get_email_by_user_id(&self, user_id: &str) -> Result<String, StoreError> {
        let id = parse_user_id(user_id)?;
        let query = "SELECT email FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?
            .ok_or(StoreError::UserNotFound)?;

        Ok(row.try_get("email")?)
    }

    async fn get_refresh_token_hash_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Vec<u8>, StoreError> {
        let id = parse_user_id(user_id)?;
        let query = "SELECT token_hash FROM users WHERE id = $1";
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?
            .ok_or(StoreError::UserNotFound)?;

        Ok(row.try_get("token_hash")?)
    }
}
