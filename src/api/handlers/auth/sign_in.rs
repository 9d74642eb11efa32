use axum::{extract::Extension, Json};
use std::sync::Arc;

use super::types::{ErrorResponse, SignInRequest};
use super::INVALID_BODY;
use crate::auth::{AuthError, AuthService, SignInResponse};

/// Create the user on first contact and mail a one-time code.
#[utoipa::path(
    post,
    path = "/v1/auth/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Code sent", body = SignInResponse),
        (status = 400, description = "Invalid request body or email", body = ErrorResponse),
        (status = 500, description = "Store or delivery failure", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn sign_in(
    service: Extension<Arc<AuthService>>,
    payload: Option<Json<SignInRequest>>,
) -> Result<Json<SignInResponse>, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput(INVALID_BODY));
    };

    let response = service.sign_in(&request.email).await?;
    Ok(Json(response))
}
