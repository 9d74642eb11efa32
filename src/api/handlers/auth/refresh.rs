use axum::{
    extract::{ConnectInfo, Extension},
    http::HeaderMap,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use super::types::{ErrorResponse, RefreshRequest};
use super::utils::client_ip;
use super::INVALID_BODY;
use crate::auth::{AuthError, AuthService, TokenPair};

/// Rotate a token pair. A changed client IP triggers an email notice.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 400, description = "Invalid token, pair or IP", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<RefreshRequest>>,
) -> Result<Json<TokenPair>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput(INVALID_BODY));
    };
    let origin_ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    let pair = service
        .refresh(&request.access_token, &request.refresh_token, &origin_ip)
        .await?;
    Ok(Json(pair))
}
