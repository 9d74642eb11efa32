use serde::{Deserialize, Serialize};

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Token group id, shared with the refresh token minted alongside.
    pub jti: String,
    pub user_id: String,
    /// Client address at issuance time.
    pub ip: String,
    pub iat: u64,
    pub exp: u64,
}

/// Claims carried by a refresh token. No user identity on purpose: the pair
/// is tied together only through `jti`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefreshClaims {
    pub jti: String,
    pub ip: String,
    pub iat: u64,
    pub exp: u64,
}
