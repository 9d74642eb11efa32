use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info_span, instrument, Instrument};

const ACCESS_SECRET_FIELD: &str = "access_token_secret";
const REFRESH_SECRET_FIELD: &str = "refresh_token_secret";

/// Read the access and refresh token HMAC keys from a KV-v2 secret.
///
/// # Errors
/// Returns an error if the Vault request fails or either key is missing or empty.
#[instrument(skip(globals))]
pub async fn read_token_secrets(
    globals: &GlobalArgs,
    kv_mount: &str,
    kv_path: &str,
) -> Result<(SecretString, SecretString)> {
    let path = format!("/v1/{kv_mount}/data/{kv_path}");
    let url = vault::endpoint_url(&globals.vault_url, &path)?;

    let span = info_span!("vault.kv.read", http.method = "GET", url = %url);
    let response = vault::client()?
        .get(&url)
        .header("X-Vault-Token", globals.vault_token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    let json = vault::response_json(&url, response).await?;
    let data = json
        .get("data")
        .and_then(|data| data.get("data"))
        .context("kv secret has no data")?;

    let secret = |field: &str| -> Result<SecretString> {
        let value = data
            .get(field)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("{field} missing from vault secret {kv_mount}/{kv_path}"))?;
        Ok(SecretString::from(value.to_string()))
    };

    Ok((secret(ACCESS_SECRET_FIELD)?, secret(REFRESH_SECRET_FIELD)?))
}
