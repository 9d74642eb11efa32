//! The sign-in, check-code and refresh flows.

use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc};
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, error, info, instrument, warn, Instrument, Span};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    config::AuthConfig,
    error::{AuthError, ErrorKind},
    store::{CredentialStore, StoreError},
    utils::{hash_refresh_token, normalize_email, refresh_token_matches, valid_email},
};
use crate::{
    email::{EmailMessage, EmailSender},
    otp::{CodeCache, OtpIssuer},
    token::{AccessClaims, TokenError, TokenManager},
};

const FLOW_SIGN_IN: &str = "sign_in";
const FLOW_CHECK_CODE: &str = "check_code";
const FLOW_REFRESH: &str = "refresh";

pub const SIGN_IN_MESSAGE: &str = "Code sent successfully";
pub const IP_CHANGE_SUBJECT: &str = "Your IP address was changed";

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SignInResponse {
    pub message: String,
    pub user_id: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Aborts the notice task if the flow is dropped before joining it.
struct NoticeTask(JoinHandle<Result<(), AuthError>>);

impl Drop for NoticeTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Entry point for the auth flows. Immutable after construction; share it
/// behind an `Arc`.
pub struct AuthService {
    config: AuthConfig,
    tokens: TokenManager,
    otp: OtpIssuer,
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn EmailSender>,
}

impl AuthService {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        tokens: TokenManager,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn CodeCache>,
        notifier: Arc<dyn EmailSender>,
    ) -> Self {
        let otp = OtpIssuer::new(cache, Arc::clone(&notifier), config.otp_ttl());
        Self {
            config,
            tokens,
            otp,
            store,
            notifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Look up or create the user behind `email` and mail them a fresh code.
    ///
    /// # Errors
    /// [`AuthError::InvalidInput`] for a malformed email, [`AuthError::Internal`]
    /// if the store or the code delivery fails.
    #[instrument(skip_all, fields(flow = FLOW_SIGN_IN, user_id = tracing::field::Empty))]
    pub async fn sign_in(&self, email: &str) -> Result<SignInResponse, AuthError> {
        self.run(FLOW_SIGN_IN, self.sign_in_inner(email)).await
    }

    /// Trade a valid code for a new token pair bound to `origin_ip`.
    ///
    /// # Errors
    /// See [`AuthError`]; the pair is only returned once its hash is stored.
    #[instrument(skip_all, fields(flow = FLOW_CHECK_CODE, user_id = %user_id))]
    pub async fn check_code(
        &self,
        user_id: &str,
        code: &str,
        origin_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        self.run(
            FLOW_CHECK_CODE,
            self.check_code_inner(user_id, code, origin_ip),
        )
        .await
    }

    /// Rotate a token pair. The presented refresh token stops working once the
    /// new hash is stored, even if the caller never sees the new pair.
    ///
    /// # Errors
    /// See [`AuthError`].
    #[instrument(skip_all, fields(flow = FLOW_REFRESH, user_id = tracing::field::Empty))]
    pub async fn refresh(
        &self,
        access_token: &str,
        refresh_token: &str,
        origin_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        self.run(
            FLOW_REFRESH,
            self.refresh_inner(access_token, refresh_token, origin_ip),
        )
        .await
    }

    /// Verify a bearer access token for protected routes.
    ///
    /// # Errors
    /// Returns [`AuthError::Unauthorized`] for any invalid token.
    pub fn authenticate(&self, access_token: &str) -> Result<AccessClaims, AuthError> {
        self.tokens.parse_access(access_token).map_err(|err| {
            debug!("bearer token rejected: {err}");
            AuthError::Unauthorized
        })
    }

    async fn run<T>(
        &self,
        flow: &'static str,
        work: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        let result = match timeout(self.config.request_timeout(), work).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::Cancelled { flow }),
        };

        if let Err(err) = &result {
            log_failure(flow, err);
        }

        result
    }

    async fn sign_in_inner(&self, email: &str) -> Result<SignInResponse, AuthError> {
        let email = normalize_email(email);
        if !valid_email(&email) {
            return Err(AuthError::InvalidInput("Invalid email"));
        }

        let user_id = self
            .store
            .get_or_create_user_id_by_email(&email)
            .await
            .map_err(|err| AuthError::internal(FLOW_SIGN_IN, err))?;
        Span::current().record("user_id", user_id.as_str());

        self.otp
            .issue_code(&user_id, &email)
            .await
            .map_err(|err| AuthError::internal(FLOW_SIGN_IN, err))?;

        Ok(SignInResponse {
            message: SIGN_IN_MESSAGE.to_string(),
            user_id,
        })
    }

    async fn check_code_inner(
        &self,
        user_id: &str,
        code: &str,
        origin_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AuthError::InvalidInput("Invalid user id"));
        }
        let origin_ip = origin_ip.trim();
        if origin_ip.is_empty() {
            return Err(AuthError::InvalidInput("Invalid user ip"));
        }
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::IncorrectCode);
        }

        let verified = self
            .otp
            .verify_code(user_id, code)
            .await
            .map_err(|err| AuthError::internal(FLOW_CHECK_CODE, err))?;
        if !verified {
            return Err(AuthError::IncorrectCode);
        }

        let pair = self
            .mint_pair(user_id, origin_ip)
            .map_err(|err| AuthError::internal(FLOW_CHECK_CODE, err))?;

        self.store
            .update_refresh_token_hash(user_id, &hash_refresh_token(&pair.refresh_token))
            .await
            .map_err(|err| match err {
                StoreError::UserNotFound => AuthError::UserNotFound,
                StoreError::Backend(_) => AuthError::internal(FLOW_CHECK_CODE, err),
            })?;

        Ok(pair)
    }

    async fn refresh_inner(
        &self,
        access_token: &str,
        refresh_token: &str,
        origin_ip: &str,
    ) -> Result<TokenPair, AuthError> {
        let origin_ip = origin_ip.trim();
        if origin_ip.is_empty() {
            return Err(AuthError::InvalidInput("Invalid user ip"));
        }

        let access = self.tokens.parse_access(access_token).map_err(|err| {
            debug!("access token rejected: {err}");
            AuthError::InvalidAccessToken
        })?;
        let refresh = self.tokens.parse_refresh(refresh_token).map_err(|err| {
            debug!("refresh token rejected: {err}");
            AuthError::InvalidRefreshToken
        })?;

        if access.jti != refresh.jti {
            return Err(AuthError::InvalidTokenPair);
        }

        let user_id = access.user_id;
        Span::current().record("user_id", user_id.as_str());

        let stored = match self.store.get_refresh_token_hash_by_user_id(&user_id).await {
            Ok(hash) => hash,
            Err(StoreError::UserNotFound) => return Err(AuthError::InvalidRefreshToken),
            Err(err) => return Err(AuthError::internal(FLOW_REFRESH, err)),
        };
        if !refresh_token_matches(&stored, refresh_token) {
            return Err(AuthError::InvalidRefreshToken);
        }

        let notice = (access.ip != origin_ip).then(|| {
            info!(previous_ip = %access.ip, current_ip = %origin_ip, "client IP changed");
            NoticeTask(tokio::spawn(
                send_ip_change_notice(
                    Arc::clone(&self.store),
                    Arc::clone(&self.notifier),
                    user_id.clone(),
                    access.ip.clone(),
                    origin_ip.to_string(),
                )
                .instrument(Span::current()),
            ))
        });

        let rotated = self.rotate(&user_id, origin_ip).await;

        let noticed = match notice {
            Some(mut task) => match (&mut task.0).await {
                Ok(result) => result,
                Err(err) => Err(AuthError::internal(FLOW_REFRESH, err)),
            },
            None => Ok(()),
        };

        let pair = rotated?;
        noticed?;
        Ok(pair)
    }

    async fn rotate(&self, user_id: &str, origin_ip: &str) -> Result<TokenPair, AuthError> {
        let pair = self
            .mint_pair(user_id, origin_ip)
            .map_err(|err| AuthError::internal(FLOW_REFRESH, err))?;

        self.store
            .update_refresh_token_hash(user_id, &hash_refresh_token(&pair.refresh_token))
            .await
            .map_err(|err| AuthError::internal(FLOW_REFRESH, err))?;

        Ok(pair)
    }

    fn mint_pair(&self, user_id: &str, origin_ip: &str) -> Result<TokenPair, TokenError> {
        let jti = Uuid::new_v4().to_string();
        Ok(TokenPair {
            access_token: self.tokens.issue_access(
                user_id,
                &jti,
                origin_ip,
                self.config.access_token_ttl(),
            )?,
            refresh_token: self.tokens.issue_refresh(
                &jti,
                origin_ip,
                self.config.refresh_token_ttl(),
            )?,
        })
    }
}

async fn send_ip_change_notice(
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn EmailSender>,
    user_id: String,
    previous_ip: String,
    current_ip: String,
) -> Result<(), AuthError> {
    let to_email = store
        .get_email_by_user_id(&user_id)
        .await
        .map_err(|err| AuthError::internal(FLOW_REFRESH, err))?;

    let message = EmailMessage {
        to_email,
        subject: IP_CHANGE_SUBJECT.to_string(),
        body: format!("Previous IP address was - {previous_ip}, now IP address is - {current_ip}"),
    };
    notifier
        .send(&message)
        .await
        .map_err(|err| AuthError::internal(FLOW_REFRESH, err))?;

    debug!("IP change notice sent");
    Ok(())
}

fn log_failure(flow: &'static str, err: &AuthError) {
    let kind = err.kind().as_str();
    match err {
        AuthError::Internal { source, .. } => {
            error!(flow, kind, "{err}: {source:?}");
        }
        AuthError::Cancelled { .. } => {
            error!(flow, kind, "deadline exceeded");
        }
        _ if err.kind() == ErrorKind::NotFound => warn!(flow, kind, "{err}"),
        _ => info!(flow, kind, "{err}"),
    }
}
