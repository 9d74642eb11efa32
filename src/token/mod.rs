//! Access/refresh token minting and verification.
//!
//! Both tokens are HS512 JWTs signed with independent secrets, so leaking one
//! key never lets an attacker forge the other kind of token. Parsing pins the
//! algorithm: a token whose header names anything other than HS512 is
//! rejected before the signature is looked at.

mod claims;

pub use claims::{AccessClaims, RefreshClaims};

use jsonwebtoken::{
    decode, encode, get_current_timestamp, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;

const ALGORITHM: Algorithm = Algorithm::HS512;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token signing key must not be empty")]
    Configuration,
    #[error("invalid token")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &SecretString) -> Result<Self, TokenError> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.is_empty() {
            return Err(TokenError::Configuration);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(bytes),
            decoding: DecodingKey::from_secret(bytes),
        })
    }
}

/// Mints and verifies token pairs. Immutable after construction and safe to
/// share across request handlers.
pub struct TokenManager {
    access: KeyPair,
    refresh: KeyPair,
    validation: Validation,
}

impl TokenManager {
    /// # Errors
    /// Returns [`TokenError::Configuration`] if either secret is empty.
    pub fn new(
        access_secret: &SecretString,
        refresh_secret: &SecretString,
    ) -> Result<Self, TokenError> {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            access: KeyPair::from_secret(access_secret)?,
            refresh: KeyPair::from_secret(refresh_secret)?,
            validation,
        })
    }

    /// Issue an access token bound to `user_id`, the token group `jti` and the client `ip`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be signed.
    pub fn issue_access(
        &self,
        user_id: &str,
        jti: &str,
        ip: &str,
        ttl: Duration,
    ) -> Result<String, TokenError> {
        let iat = get_current_timestamp();
        let claims = AccessClaims {
            jti: jti.to_string(),
            user_id: user_id.to_string(),
            ip: ip.to_string(),
            iat,
            exp: iat.saturating_add(ttl.as_secs()),
        };
        sign(&claims, &self.access.encoding)
    }

    /// Issue a refresh token for the token group `jti`.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be signed.
    pub fn issue_refresh(&self, jti: &str, ip: &str, ttl: Duration) -> Result<String, TokenError> {
        let iat = get_current_timestamp();
        let claims = RefreshClaims {
            jti: jti.to_string(),
            ip: ip.to_string(),
            iat,
            exp: iat.saturating_add(ttl.as_secs()),
        };
        sign(&claims, &self.refresh.encoding)
    }

    /// # Errors
    /// Returns [`TokenError::InvalidToken`] on any format, algorithm, signature or expiry failure.
    pub fn parse_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        verify(token, &self.access.decoding, &self.validation)
    }

    /// # Errors
    /// Returns [`TokenError::InvalidToken`] on any format, algorithm, signature or expiry failure.
    pub fn parse_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        verify(token, &self.refresh.decoding, &self.validation)
    }
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, TokenError> {
    encode(&Header::new(ALGORITHM), claims, key).map_err(TokenError::Signing)
}

fn verify<T: DeserializeOwned>(
    token: &str,
    key: &DecodingKey,
    validation: &Validation,
) -> Result<T, TokenError> {
    decode::<T>(token, key, validation)
        .map(|data| data.claims)
        .map_err(TokenError::InvalidToken)
}
