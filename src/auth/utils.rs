//! Small helpers for input validation and refresh token hashing.

use regex::Regex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Normalize an email for lookup/uniqueness checks.
pub(super) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(super) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Hash a refresh token so raw values never touch the database.
/// Used both when persisting a new token and when checking a presented one.
pub(crate) fn hash_refresh_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Constant-time check of a presented refresh token against the stored hash.
/// An empty stored hash is the never-issued sentinel and matches nothing.
pub(super) fn refresh_token_matches(stored: &[u8], token: &str) -> bool {
    !stored.is_empty() && bool::from(stored.ct_eq(&hash_refresh_token(token)))
}
