//! HTTP adapters over [`crate::auth::AuthService`].
//!
//! Handlers only decode the request and resolve the caller's IP; every
//! protocol decision and all failure logging happen in the service. Failures
//! render as `{"message": "..."}` with the status of the [`AuthError`].

pub(crate) mod check_code;
pub(crate) mod principal;
pub(crate) mod refresh;
pub(crate) mod sign_in;
pub(crate) mod types;
mod utils;

pub use principal::AccessPrincipal;

use axum::{
    response::{IntoResponse, Response},
    Json,
};

use crate::auth::AuthError;
use types::ErrorResponse;

pub(crate) const INVALID_BODY: &str = "Invalid request body";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
