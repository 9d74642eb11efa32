//! # otpgate
//!
//! Passwordless authentication with emailed one-time codes and rotating
//! HS512 token pairs.
//!
//! ## Flow
//!
//! - **Sign in:** an email address is resolved to a stable user id and a
//!   5-digit code is mailed to it. The code lives in Redis for a short TTL.
//! - **Check code:** a matching code is consumed (single use) and a token pair
//!   is minted, bound to the caller's IP address.
//! - **Refresh:** the refresh token is accepted only if its `jti` matches the
//!   access token and its SHA-256 hash matches the one stored for the user.
//!   Each refresh rotates both tokens and invalidates the previous pair. A
//!   refresh from a new IP address rebinds the pair and mails the user a notice.
//!
//! Token signing keys and database credentials come from the command line or,
//! with `--vault-url`, from Vault.

pub mod api;
pub mod auth;
pub mod cli;
pub mod email;
pub mod otp;
pub mod token;
pub mod vault;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Error type carried by the storage, cache and email seams.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
