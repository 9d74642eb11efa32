use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{anyhow, Result};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::{info_span, instrument, Instrument};

/// Vault database secrets engine role otpgate reads credentials from.
const DATABASE_CREDS_PATH: &str = "/v1/database/creds/otpgate";

/// Get DB credentials from Vault and store them, with their lease, in `globals`.
///
/// # Errors
/// Returns an error if the request fails or a field is missing from the response.
#[instrument(skip(globals))]
pub async fn database_creds(globals: &mut GlobalArgs) -> Result<()> {
    let db_creds = vault::endpoint_url(&globals.vault_url, DATABASE_CREDS_PATH)?;

    let span = info_span!("vault.database_creds", http.method = "GET", url = %db_creds);
    let response = vault::client()?
        .get(&db_creds)
        .header("X-Vault-Token", globals.vault_token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    let json_response = vault::response_json(&db_creds, response).await?;

    let field = |name: &str| {
        json_response
            .get("data")
            .and_then(|data| data.get(name))
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Error parsing JSON response: no {name} found"))
    };

    let username = field("username")?.to_string();
    let password = field("password")?.to_string();

    globals.vault_db_lease_id = json_response
        .get("lease_id")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_id found"))?
        .to_string();
    globals.vault_db_lease_duration = json_response
        .get("lease_duration")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))?;
    globals.vault_db_username = username;
    globals.vault_db_password = SecretString::from(password);

    Ok(())
}
