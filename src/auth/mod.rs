//! Passwordless authentication flows.
//!
//! A login attempt moves `Anonymous -> OTP pending -> Authenticated` and then
//! through any number of refreshes:
//!
//! - **Sign-in** creates the user on first contact and mails a five digit code.
//! - **Check-code** consumes the code and returns an access/refresh pair that
//!   shares one token group id (`jti`) and the caller's IP.
//! - **Refresh** rotates the pair. Only `SHA-256(refresh token)` is stored, so
//!   each rotation invalidates the previous refresh token. When the caller's IP
//!   differs from the one in the access token, a notice is mailed to the user
//!   and the rotation still goes ahead.
//!
//! ## Known limitation
//!
//! Two concurrent refreshes with the same valid refresh token can both pass
//! the hash check before either overwrite lands. Refresh tokens are single-use
//! only for sequential callers.

mod config;
mod error;
mod service;
mod store;
mod utils;

pub use config::AuthConfig;
pub use error::{AuthError, ErrorKind};
pub use service::{AuthService, SignInResponse, TokenPair, IP_CHANGE_SUBJECT, SIGN_IN_MESSAGE};
pub use store::{CredentialStore, PgCredentialStore, StoreError};
pub(crate) use utils::hash_refresh_token;

#[cfg(test)]
pub(crate) mod test_support;

#[cfg(test)]
mod tests;
