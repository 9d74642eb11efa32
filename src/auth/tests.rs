//! Auth flow tests against in-memory collaborators.

use super::test_support::{MemoryCache, MemoryStore, RecordingEmailSender};
use super::{
    hash_refresh_token, AuthConfig, AuthError, AuthService, TokenPair, IP_CHANGE_SUBJECT,
    SIGN_IN_MESSAGE,
};
use crate::otp::{CodeCache, CODE_SUBJECT};
use crate::token::TokenManager;
use anyhow::{anyhow, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};

const ACCESS_SECRET: &str = "access-secret";
const REFRESH_SECRET: &str = "refresh-secret";
const EMAIL: &str = "a@b.com";

fn token_manager() -> Result<TokenManager> {
    Ok(TokenManager::new(
        &SecretString::from(ACCESS_SECRET.to_string()),
        &SecretString::from(REFRESH_SECRET.to_string()),
    )?)
}

struct Harness {
    service: AuthService,
    store: Arc<MemoryStore>,
    cache: Arc<MemoryCache>,
    sender: Arc<RecordingEmailSender>,
}

impl Harness {
    fn new() -> Result<Self> {
        Self::with_config(AuthConfig::new())
    }

    fn with_config(config: AuthConfig) -> Result<Self> {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(MemoryCache::default());
        let sender = Arc::new(RecordingEmailSender::default());
        let service = AuthService::new(
            config,
            token_manager()?,
            store.clone(),
            cache.clone(),
            sender.clone(),
        );
        Ok(Self {
            service,
            store,
            cache,
            sender,
        })
    }

    fn pending_code(&self, user_id: &str) -> Option<String> {
        self.cache.peek(&format!("user_{user_id}"))
    }

    /// Sign in and exchange the mailed code for a pair from `ip`.
    async fn login(&self, ip: &str) -> Result<(String, TokenPair)> {
        let user_id = self.service.sign_in(EMAIL).await?.user_id;
        let code = self
            .pending_code(&user_id)
            .ok_or_else(|| anyhow!("no pending code"))?;
        let pair = self.service.check_code(&user_id, &code, ip).await?;
        Ok((user_id, pair))
    }

    fn notices(&self) -> usize {
        self.sender
            .messages()
            .iter()
            .filter(|message| message.subject == IP_CHANGE_SUBJECT)
            .count()
    }
}

fn wrong_code(code: &str) -> &'static str {
    if code == "00000" {
        "11111"
    } else {
        "00000"
    }
}

#[tokio::test]
async fn sign_in_is_idempotent_per_email() -> Result<()> {
    let harness = Harness::new()?;

    let first = harness.service.sign_in(EMAIL).await?;
    let second = harness.service.sign_in(" A@B.com ").await?;

    assert_eq!(first.message, SIGN_IN_MESSAGE);
    assert_eq!(first.user_id, second.user_id);
    Ok(())
}

#[tokio::test]
async fn sign_in_mails_code_but_never_returns_it() -> Result<()> {
    let harness = Harness::new()?;

    let response = harness.service.sign_in(EMAIL).await?;
    let code = harness
        .pending_code(&response.user_id)
        .ok_or_else(|| anyhow!("no pending code"))?;

    assert_eq!(code.len(), 5);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    assert!(!response.message.contains(&code));

    let messages = harness.sender.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].to_email, EMAIL);
    assert_eq!(messages[0].subject, CODE_SUBJECT);
    assert_eq!(messages[0].body, code);
    Ok(())
}

#[tokio::test]
async fn sign_in_rejects_malformed_email_before_store() -> Result<()> {
    let harness = Harness::new()?;

    let result = harness.service.sign_in("not-an-email").await;
    assert!(matches!(result, Err(AuthError::InvalidInput("Invalid email"))));
    assert_eq!(harness.store.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn sign_in_send_failure_is_internal() -> Result<()> {
    let harness = Harness::new()?;
    harness.sender.fail_sends(true);

    let result = harness.service.sign_in(EMAIL).await;
    assert!(matches!(result, Err(AuthError::Internal { flow: "sign_in", .. })));
    Ok(())
}

#[tokio::test]
async fn sign_in_store_failure_is_internal() -> Result<()> {
    let harness = Harness::new()?;
    harness.store.fail_creates(true);

    let result = harness.service.sign_in(EMAIL).await;
    assert!(matches!(result, Err(AuthError::Internal { flow: "sign_in", .. })));
    assert!(harness.sender.messages().is_empty());
    Ok(())
}

#[tokio::test]
async fn check_code_validates_ids_before_cache() -> Result<()> {
    let harness = Harness::new()?;
    let user_id = harness.service.sign_in(EMAIL).await?.user_id;
    let code = harness.pending_code(&user_id).unwrap_or_default();
    harness.cache.fail_reads(true);

    let result = harness.service.check_code("", &code, "1.2.3.4").await;
    assert!(matches!(result, Err(AuthError::InvalidInput("Invalid user id"))));

    let result = harness.service.check_code(&user_id, &code, "").await;
    assert!(matches!(result, Err(AuthError::InvalidInput("Invalid user ip"))));

    let result = harness.service.check_code(&user_id, "", "1.2.3.4").await;
    assert!(matches!(result, Err(AuthError::IncorrectCode)));

    // Reads would have failed, so none of the above touched the cache.
    harness.cache.fail_reads(false);
    assert_eq!(harness.pending_code(&user_id), Some(code));
    Ok(())
}

#[tokio::test]
async fn code_is_single_use() -> Result<()> {
    let harness = Harness::new()?;
    let user_id = harness.service.sign_in(EMAIL).await?.user_id;
    let code = harness.pending_code(&user_id).unwrap_or_default();

    harness.service.check_code(&user_id, &code, "1.2.3.4").await?;
    let again = harness.service.check_code(&user_id, &code, "1.2.3.4").await;

    assert!(matches!(again, Err(AuthError::IncorrectCode)));
    Ok(())
}

#[tokio::test]
async fn expired_code_is_incorrect() -> Result<()> {
    let harness = Harness::new()?;
    let user_id = harness.service.sign_in(EMAIL).await?.user_id;

    harness
        .cache
        .set(&format!("user_{user_id}"), "12345", Duration::from_millis(10))
        .await?;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let result = harness.service.check_code(&user_id, "12345", "1.2.3.4").await;
    assert!(matches!(result, Err(AuthError::IncorrectCode)));
    Ok(())
}

#[tokio::test]
async fn check_code_persists_refresh_hash() -> Result<()> {
    let harness = Harness::new()?;
    let (user_id, pair) = harness.login("1.2.3.4").await?;

    assert_eq!(
        harness.store.token_hash(&user_id),
        Some(hash_refresh_token(&pair.refresh_token))
    );

    let tokens = token_manager()?;
    let access = tokens.parse_access(&pair.access_token)?;
    let refresh = tokens.parse_refresh(&pair.refresh_token)?;
    assert_eq!(access.user_id, user_id);
    assert_eq!(access.ip, "1.2.3.4");
    assert_eq!(access.jti, refresh.jti);
    assert_eq!(refresh.ip, "1.2.3.4");
    assert_eq!(access.exp - access.iat, 900);
    assert_eq!(refresh.exp - refresh.iat, 2_592_000);
    Ok(())
}

#[tokio::test]
async fn check_code_store_failure_returns_no_tokens() -> Result<()> {
    let harness = Harness::new()?;
    let user_id = harness.service.sign_in(EMAIL).await?.user_id;
    let code = harness.pending_code(&user_id).unwrap_or_default();
    harness.store.fail_updates(true);

    let result = harness.service.check_code(&user_id, &code, "1.2.3.4").await;
    assert!(matches!(
        result,
        Err(AuthError::Internal {
            flow: "check_code",
            ..
        })
    ));
    assert_eq!(harness.store.token_hash(&user_id), Some(Vec::new()));
    Ok(())
}

#[tokio::test]
async fn check_code_for_vanished_user_is_not_found() -> Result<()> {
    let harness = Harness::new()?;
    let user_id = harness.service.sign_in(EMAIL).await?.user_id;
    let code = harness.pending_code(&user_id).unwrap_or_default();
    harness.store.remove_user(&user_id);

    let result = harness.service.check_code(&user_id, &code, "1.2.3.4").await;
    assert!(matches!(result, Err(AuthError::UserNotFound)));
    Ok(())
}

#[tokio::test]
async fn refresh_rejects_mismatched_pair_without_store() -> Result<()> {
    let harness = Harness::new()?;
    let tokens = token_manager()?;
    let ttl = Duration::from_secs(60);
    let access = tokens.issue_access("u1", "group-a", "1.2.3.4", ttl)?;
    let refresh = tokens.issue_refresh("group-b", "1.2.3.4", ttl)?;

    let result = harness.service.refresh(&access, &refresh, "1.2.3.4").await;
    assert!(matches!(result, Err(AuthError::InvalidTokenPair)));
    assert_eq!(harness.store.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn refresh_distinguishes_bad_tokens() -> Result<()> {
    let harness = Harness::new()?;
    let (_, pair) = harness.login("1.2.3.4").await?;

    let result = harness
        .service
        .refresh("garbage", &pair.refresh_token, "1.2.3.4")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidAccessToken)));

    let result = harness
        .service
        .refresh(&pair.access_token, "garbage", "1.2.3.4")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));

    // Swapped tokens fail on the access key first.
    let result = harness
        .service
        .refresh(&pair.refresh_token, &pair.access_token, "1.2.3.4")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidAccessToken)));

    let result = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, " ")
        .await;
    assert!(matches!(result, Err(AuthError::InvalidInput("Invalid user ip"))));
    Ok(())
}

#[tokio::test]
async fn refresh_rejects_never_issued_hash() -> Result<()> {
    let harness = Harness::new()?;
    let user_id = harness.service.sign_in(EMAIL).await?.user_id;
    let tokens = token_manager()?;
    let ttl = Duration::from_secs(60);
    let access = tokens.issue_access(&user_id, "g", "1.2.3.4", ttl)?;
    let refresh = tokens.issue_refresh("g", "1.2.3.4", ttl)?;

    let result = harness.service.refresh(&access, &refresh, "1.2.3.4").await;
    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    Ok(())
}

#[tokio::test]
async fn refresh_for_unknown_user_is_invalid_refresh_token() -> Result<()> {
    let harness = Harness::new()?;
    let tokens = token_manager()?;
    let ttl = Duration::from_secs(60);
    let access = tokens.issue_access("ghost", "g", "1.2.3.4", ttl)?;
    let refresh = tokens.issue_refresh("g", "1.2.3.4", ttl)?;

    let result = harness.service.refresh(&access, &refresh, "1.2.3.4").await;
    assert!(matches!(result, Err(AuthError::InvalidRefreshToken)));
    Ok(())
}

#[tokio::test]
async fn refresh_hash_lookup_failure_is_internal() -> Result<()> {
    let harness = Harness::new()?;
    let (user_id, pair) = harness.login("1.2.3.4").await?;
    harness.store.fail_hash_lookups(true);

    let result = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "1.2.3.4")
        .await;
    assert!(matches!(result, Err(AuthError::Internal { flow: "refresh", .. })));
    assert_eq!(
        harness.store.token_hash(&user_id),
        Some(hash_refresh_token(&pair.refresh_token))
    );
    Ok(())
}

#[tokio::test]
async fn refresh_rotation_store_failure_is_internal() -> Result<()> {
    let harness = Harness::new()?;
    let (user_id, pair) = harness.login("1.2.3.4").await?;
    harness.store.fail_updates(true);

    let result = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "1.2.3.4")
        .await;
    assert!(matches!(result, Err(AuthError::Internal { flow: "refresh", .. })));

    // The old pair stays valid once the store recovers.
    harness.store.fail_updates(false);
    assert_eq!(
        harness.store.token_hash(&user_id),
        Some(hash_refresh_token(&pair.refresh_token))
    );
    harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "1.2.3.4")
        .await?;
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_and_kills_old_token() -> Result<()> {
    let harness = Harness::new()?;
    let (user_id, pair) = harness.login("1.2.3.4").await?;

    let rotated = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "1.2.3.4")
        .await?;
    assert_ne!(rotated.refresh_token, pair.refresh_token);
    assert_eq!(
        harness.store.token_hash(&user_id),
        Some(hash_refresh_token(&rotated.refresh_token))
    );

    let replay = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "1.2.3.4")
        .await;
    assert!(matches!(replay, Err(AuthError::InvalidRefreshToken)));

    harness
        .service
        .refresh(&rotated.access_token, &rotated.refresh_token, "1.2.3.4")
        .await?;
    Ok(())
}

#[tokio::test]
async fn refresh_from_new_ip_sends_notice_and_rebinds() -> Result<()> {
    let harness = Harness::new()?;
    let (_, pair) = harness.login("1.2.3.4").await?;

    let rotated = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "9.9.9.9")
        .await?;

    let notices: Vec<_> = harness
        .sender
        .messages()
        .into_iter()
        .filter(|message| message.subject == IP_CHANGE_SUBJECT)
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].to_email, EMAIL);
    assert_eq!(
        notices[0].body,
        "Previous IP address was - 1.2.3.4, now IP address is - 9.9.9.9"
    );

    let claims = token_manager()?.parse_access(&rotated.access_token)?;
    assert_eq!(claims.ip, "9.9.9.9");
    Ok(())
}

#[tokio::test]
async fn failed_notice_fails_refresh_after_rotation() -> Result<()> {
    let harness = Harness::new()?;
    let (user_id, pair) = harness.login("1.2.3.4").await?;
    harness.sender.fail_sends(true);

    let result = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "9.9.9.9")
        .await;
    assert!(matches!(result, Err(AuthError::Internal { flow: "refresh", .. })));

    // Rotation still happened; the presented token is spent.
    assert_ne!(
        harness.store.token_hash(&user_id),
        Some(hash_refresh_token(&pair.refresh_token))
    );
    Ok(())
}

#[tokio::test]
async fn failed_email_lookup_fails_refresh() -> Result<()> {
    let harness = Harness::new()?;
    let (_, pair) = harness.login("1.2.3.4").await?;
    harness.store.fail_email_lookups(true);

    let result = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "9.9.9.9")
        .await;
    assert!(matches!(result, Err(AuthError::Internal { .. })));
    Ok(())
}

#[tokio::test]
async fn slow_store_hits_deadline() -> Result<()> {
    let harness = Harness::with_config(AuthConfig::new().with_request_timeout_seconds(0))?;
    harness.store.set_delay(Duration::from_millis(50));

    let result = harness.service.sign_in(EMAIL).await;
    assert!(matches!(result, Err(AuthError::Cancelled { flow: "sign_in" })));
    Ok(())
}

#[tokio::test]
async fn authenticate_maps_failures_to_unauthorized() -> Result<()> {
    let harness = Harness::new()?;
    let (user_id, pair) = harness.login("1.2.3.4").await?;

    let claims = harness.service.authenticate(&pair.access_token)?;
    assert_eq!(claims.user_id, user_id);

    assert!(matches!(
        harness.service.authenticate(&pair.refresh_token),
        Err(AuthError::Unauthorized)
    ));
    Ok(())
}

#[tokio::test]
async fn sign_in_to_rotation_scenario() -> Result<()> {
    let harness = Harness::new()?;

    let user_id = harness.service.sign_in(EMAIL).await?.user_id;
    let code = harness
        .pending_code(&user_id)
        .ok_or_else(|| anyhow!("no pending code"))?;

    let wrong = harness
        .service
        .check_code(&user_id, wrong_code(&code), "1.2.3.4")
        .await;
    assert!(matches!(wrong, Err(AuthError::IncorrectCode)));
    assert_eq!(wrong.err().map(|err| err.to_string()).as_deref(), Some("Incorrect code"));

    let pair = harness.service.check_code(&user_id, &code, "1.2.3.4").await?;
    assert_eq!(harness.pending_code(&user_id), None);

    harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "1.2.3.4")
        .await?;
    assert_eq!(harness.notices(), 0);

    let stale = harness
        .service
        .refresh(&pair.access_token, &pair.refresh_token, "9.9.9.9")
        .await;
    assert!(matches!(stale, Err(AuthError::InvalidRefreshToken)));
    assert_eq!(harness.notices(), 0);
    Ok(())
}
