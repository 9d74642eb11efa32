use axum::http::StatusCode;
use thiserror::Error;

use crate::BoxError;

/// Coarse class of an auth failure, used for logging and status mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Auth,
    NotFound,
    Dependency,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Auth => "auth",
            Self::NotFound => "not_found",
            Self::Dependency => "dependency",
        }
    }
}

/// Failure of one of the auth flows. `Display` is the message shown to
/// clients; dependency details stay in `source` and only reach the logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(&'static str),
    #[error("Incorrect code")]
    IncorrectCode,
    #[error("Invalid token pair")]
    InvalidTokenPair,
    #[error("Invalid access token")]
    InvalidAccessToken,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("User not found")]
    UserNotFound,
    #[error("Internal server error")]
    Internal {
        flow: &'static str,
        #[source]
        source: BoxError,
    },
    #[error("Internal server error")]
    Cancelled { flow: &'static str },
}

impl AuthError {
    pub(crate) fn internal(flow: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Internal {
            flow,
            source: source.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::Input,
            Self::IncorrectCode
            | Self::InvalidTokenPair
            | Self::InvalidAccessToken
            | Self::InvalidRefreshToken
            | Self::Unauthorized => ErrorKind::Auth,
            Self::UserNotFound => ErrorKind::NotFound,
            Self::Internal { .. } | Self::Cancelled { .. } => ErrorKind::Dependency,
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Internal { .. } | Self::Cancelled { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidInput(_)
            | Self::IncorrectCode
            | Self::InvalidTokenPair
            | Self::InvalidAccessToken
            | Self::InvalidRefreshToken => StatusCode::BAD_REQUEST,
        }
    }
}
