//! One-time code issuance and verification.
//!
//! A code is five decimal digits drawn from the OS CSPRNG. It is mailed first
//! and cached second: a code that never reached the user is never stored, so a
//! failed send leaves any previously issued code untouched.
//!
//! The cache holds at most one pending code per user under `user_{id}`. A new
//! sign-in overwrites it and a successful verification deletes it.

mod cache;

pub use cache::{CacheError, CodeCache, RedisCodeCache};

use rand::{rngs::OsRng, RngCore};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{
    email::{EmailMessage, EmailSender},
    BoxError,
};

pub const CODE_LENGTH: usize = 5;
pub const CODE_SUBJECT: &str = "Your one time password";

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("failed to generate code")]
    Random(#[source] rand::Error),
    #[error("failed to send code")]
    Send(#[source] BoxError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Cache key holding the pending code of `user_id`.
#[must_use]
pub fn cache_key(user_id: &str) -> String {
    format!("user_{user_id}")
}

/// Draw a fresh numeric code.
///
/// # Errors
/// Returns [`OtpError::Random`] if the OS random source fails.
pub fn generate_code() -> Result<String, OtpError> {
    let mut bytes = [0u8; CODE_LENGTH];
    OsRng.try_fill_bytes(&mut bytes).map_err(OtpError::Random)?;
    Ok(bytes.iter().map(|byte| char::from(b'0' + byte % 10)).collect())
}

#[derive(Clone)]
pub struct OtpIssuer {
    cache: Arc<dyn CodeCache>,
    sender: Arc<dyn EmailSender>,
    ttl: Duration,
}

impl OtpIssuer {
    #[must_use]
    pub fn new(cache: Arc<dyn CodeCache>, sender: Arc<dyn EmailSender>, ttl: Duration) -> Self {
        Self { cache, sender, ttl }
    }

    /// Generate a code, mail it to `email` and remember it for `user_id`.
    ///
    /// # Errors
    /// Returns an error if generation, delivery or caching fails. Nothing is
    /// retried.
    #[instrument(skip(self, email))]
    pub async fn issue_code(&self, user_id: &str, email: &str) -> Result<(), OtpError> {
        let code = generate_code()?;

        let message = EmailMessage {
            to_email: email.to_string(),
            subject: CODE_SUBJECT.to_string(),
            body: code.clone(),
        };
        self.sender
            .send(&message)
            .await
            .map_err(|err| OtpError::Send(err.into()))?;

        self.cache.set(&cache_key(user_id), &code, self.ttl).await?;

        debug!("code issued");
        Ok(())
    }

    /// Check `code` against the pending code of `user_id`, consuming it on a
    /// match.
    ///
    /// # Errors
    /// Returns [`OtpError::Cache`] if the pending code cannot be read.
    #[instrument(skip(self, code))]
    pub async fn verify_code(&self, user_id: &str, code: &str) -> Result<bool, OtpError> {
        let key = cache_key(user_id);

        let Some(expected) = self.cache.get(&key).await? else {
            debug!("no pending code");
            return Ok(false);
        };

        if expected != code {
            return Ok(false);
        }

        if let Err(err) = self.cache.delete(&key).await {
            // The entry still expires on its own.
            warn!("Failed to delete consumed code: {err}");
        }

        Ok(true)
    }
}
