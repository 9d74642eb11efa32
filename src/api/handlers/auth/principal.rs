//! Bearer access token extraction for protected routes.

use anyhow::anyhow;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, Json};
use std::sync::Arc;

use super::types::{ErrorResponse, WhoAmIResponse};
use super::utils::bearer_token;
use crate::auth::{AuthError, AuthService};

/// Caller identity taken from a verified access token.
#[derive(Clone, Debug)]
pub struct AccessPrincipal {
    pub user_id: String,
    pub ip: String,
    pub jti: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AccessPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| AuthError::internal("authenticate", anyhow!("auth service missing")))?;

        let token = bearer_token(&parts.headers).ok_or(AuthError::Unauthorized)?;
        let claims = service.authenticate(token)?;

        Ok(Self {
            user_id: claims.user_id,
            ip: claims.ip,
            jti: claims.jti,
        })
    }
}

/// Identity behind the presented access token.
#[utoipa::path(
    get,
    path = "/v1/auth/whoami",
    params(
        ("Authorization" = String, Header, description = "Access token, optionally prefixed with `Bearer `")
    ),
    responses(
        (status = 200, description = "Token is valid", body = WhoAmIResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn whoami(principal: AccessPrincipal) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        user_id: principal.user_id,
        ip: principal.ip,
    })
}
