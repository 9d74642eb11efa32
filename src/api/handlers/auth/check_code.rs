use axum::{
    extract::{ConnectInfo, Extension, Query},
    http::HeaderMap,
    Json,
};
use std::{net::SocketAddr, sync::Arc};

use super::types::{CheckCodeParams, CheckCodeRequest, ErrorResponse};
use super::utils::client_ip;
use super::INVALID_BODY;
use crate::auth::{AuthError, AuthService, TokenPair};

/// Exchange the mailed code for an access/refresh pair.
#[utoipa::path(
    post,
    path = "/v1/auth/check-code",
    params(CheckCodeParams),
    request_body = CheckCodeRequest,
    responses(
        (status = 200, description = "Code accepted", body = TokenPair),
        (status = 400, description = "Invalid input or incorrect code", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn check_code(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    params: Option<Query<CheckCodeParams>>,
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<CheckCodeRequest>>,
) -> Result<Json<TokenPair>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput(INVALID_BODY));
    };
    let params = params.map(|Query(params)| params).unwrap_or_default();
    let origin_ip = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));

    let pair = service
        .check_code(&params.user_id, &request.code, &origin_ip)
        .await?;
    Ok(Json(pair))
}
