//! In-memory doubles for the auth collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::{Duration, Instant},
};
use uuid::Uuid;

use super::store::{CredentialStore, StoreError};
use crate::{
    email::{EmailMessage, EmailSender},
    otp::{CacheError, CodeCache},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Debug)]
struct UserRecord {
    email: String,
    token_hash: Vec<u8>,
}

/// Credential store backed by a map. Counts every call so tests can assert a
/// flow never reached storage.
#[derive(Default)]
pub(crate) struct MemoryStore {
    users: Mutex<HashMap<String, UserRecord>>,
    calls: AtomicUsize,
    fail_creates: AtomicBool,
    fail_updates: AtomicBool,
    fail_email_lookups: AtomicBool,
    fail_hash_lookups: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_updates(&self, fail: bool) {
        self.fail_updates.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_email_lookups(&self, fail: bool) {
        self.fail_email_lookups.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_hash_lookups(&self, fail: bool) {
        self.fail_hash_lookups.store(fail, Ordering::SeqCst);
    }

    /// Delay every call, for deadline tests.
    pub(crate) fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub(crate) fn remove_user(&self, user_id: &str) {
        lock(&self.users).remove(user_id);
    }

    pub(crate) fn token_hash(&self, user_id: &str) -> Option<Vec<u8>> {
        lock(&self.users)
            .get(user_id)
            .map(|record| record.token_hash.clone())
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn backend(message: &'static str) -> StoreError {
    StoreError::Backend(anyhow!(message).into())
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_or_create_user_id_by_email(&self, email: &str) -> Result<String, StoreError> {
        self.enter().await;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(backend("insert failed"));
        }
        let mut users = lock(&self.users);
        if let Some((id, _)) = users.iter().find(|(_, record)| record.email == email) {
            return Ok(id.clone());
        }
        let id = Uuid::new_v4().to_string();
        users.insert(
            id.clone(),
            UserRecord {
                email: email.to_string(),
                token_hash: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn update_refresh_token_hash(
        &self,
        user_id: &str,
        hash: &[u8],
    ) -> Result<(), StoreError> {
        self.enter().await;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(backend("update failed"));
        }
        let mut users = lock(&self.users);
        let record = users.get_mut(user_id).ok_or(StoreError::UserNotFound)?;
        record.token_hash = hash.to_vec();
        Ok(())
    }

    async fn get_email_by_user_id(&self, user_id: &str) -> Result<String, StoreError> {
        self.enter().await;
        if self.fail_email_lookups.load(Ordering::SeqCst) {
            return Err(backend("lookup failed"));
        }
        lock(&self.users)
            .get(user_id)
            .map(|record| record.email.clone())
            .ok_or(StoreError::UserNotFound)
    }

    async fn get_refresh_token_hash_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Vec<u8>, StoreError> {
        self.enter().await;
        if self.fail_hash_lookups.load(Ordering::SeqCst) {
            return Err(backend("lookup failed"));
        }
        self.token_hash(user_id).ok_or(StoreError::UserNotFound)
    }
}

/// Code cache honoring per-key expiry.
#[derive(Default)]
pub(crate) struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryCache {
    pub(crate) fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Current live value, without consuming it.
    pub(crate) fn peek(&self, key: &str) -> Option<String> {
        lock(&self.entries)
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone())
    }
}

#[async_trait]
impl CodeCache for MemoryCache {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError(anyhow!("cache unavailable").into()));
        }
        lock(&self.entries).insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CacheError(anyhow!("cache unavailable").into()));
        }
        Ok(self.peek(key))
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        lock(&self.entries).remove(key);
        Ok(())
    }
}

/// Email sender that keeps every message it was asked to deliver.
#[derive(Default)]
pub(crate) struct RecordingEmailSender {
    messages: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

impl RecordingEmailSender {
    pub(crate) fn fail_sends(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn messages(&self) -> Vec<EmailMessage> {
        lock(&self.messages).clone()
    }

    pub(crate) fn last_body(&self) -> Option<String> {
        lock(&self.messages).last().map(|message| message.body.clone())
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("relay unavailable"));
        }
        lock(&self.messages).push(message.clone());
        Ok(())
    }
}
