//! Vault `AppRole` login plus the secrets otpgate leases from it: dynamic
//! database credentials and the token signing keys kept in KV-v2.

pub mod database;
pub mod kv;
pub mod renew;

use anyhow::{anyhow, Result};
use reqwest::{Client, Response};
use serde_json::{json, Value};
use tracing::{debug, info_span, instrument, Instrument};
use url::Url;

fn client() -> Result<Client> {
    Ok(Client::builder().user_agent(crate::APP_USER_AGENT).build()?)
}

fn vault_error_message(json_response: &Value) -> &str {
    json_response
        .get("errors")
        .and_then(|v| v.get(0))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Decode a Vault response, turning non-2xx statuses into `url - status, first error`.
async fn response_json(url: &str, response: Response) -> Result<Value> {
    let status = response.status();
    let json_response: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
        return Err(anyhow!(
            "{} - {}, {}",
            url,
            status,
            vault_error_message(&json_response)
        ));
    }

    Ok(json_response)
}

/// Build `scheme://host:port{path}` from the configured Vault URL.
///
/// # Errors
/// Returns an error if the URL has no host or an unsupported scheme.
pub fn endpoint_url(url: &str, path: &str) -> Result<String> {
    let url = Url::parse(url)?;

    let scheme = url.scheme();

    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("Error parsing URL: no host specified"))?;

    let port = match (url.port(), scheme) {
        (Some(port), _) => port,
        (None, "http") => 80,
        (None, "https") => 443,
        (None, _) => return Err(anyhow!("Error parsing URL: unsupported scheme {}", scheme)),
    };

    let endpoint_url = format!("{scheme}://{host}:{port}{path}");

    debug!("endpoint URL: {}", endpoint_url);

    Ok(endpoint_url)
}

/// Unwrap a wrapped `AppRole` secret id
/// Create wrapped token with:
/// vault write -wrap-ttl=300s -f auth/approle/role/otpgate/secret-id
///
/// # Errors
/// Returns an error if the request fails or the response has no `secret_id`.
#[instrument(skip(token))]
pub async fn unwrap(url: &str, token: &str) -> Result<String> {
    let unwrap_url = endpoint_url(url, "/v1/sys/wrapping/unwrap")?;

    let span = info_span!("vault.unwrap", http.method = "POST", url = %unwrap_url);
    let response = client()?
        .post(&unwrap_url)
        .header("X-Vault-Token", token)
        .send()
        .instrument(span)
        .await?;

    let json_response = response_json(&unwrap_url, response).await?;

    json_response
        .get("data")
        .and_then(|data| data.get("secret_id"))
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no secret_id found"))
}

/// Login to Vault using `AppRole`, returns the client token and its lease duration.
///
/// # Errors
/// Returns an error if the login is rejected or the response has no `client_token`.
#[instrument(skip(sid))]
pub async fn approle_login(url: &str, sid: &str, rid: &str) -> Result<(String, u64)> {
    let login_payload = json!({
        "role_id": rid,
        "secret_id": sid
    });

    debug!("login URL: {}, role ID: {}", url, rid);

    let span = info_span!("vault.approle_login", http.method = "POST", url = %url);
    let response = client()?
        .post(url)
        .json(&login_payload)
        .send()
        .instrument(span)
        .await?;

    let json_response = response_json(url, response).await?;
    let auth = json_response.get("auth");

    let token = auth
        .and_then(|auth| auth.get("client_token"))
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no client_token found"))?;
    let lease_duration = auth
        .and_then(|auth| auth.get("lease_duration"))
        .and_then(Value::as_u64)
        .unwrap_or(1800);

    Ok((token.to_string(), lease_duration))
}
