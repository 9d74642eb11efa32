use crate::{cli::globals::GlobalArgs, vault};
use anyhow::{anyhow, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::future::Future;
use tokio::{
    sync::mpsc,
    time::{sleep, Duration},
};
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

const RENEW_ATTEMPTS: u32 = 3;

/// Renew the Vault client token, returns the new lease duration.
#[instrument(skip(token))]
async fn renew_token(url: &str, token: &SecretString) -> Result<u64> {
    let renew_url = vault::endpoint_url(url, "/v1/auth/token/renew-self")?;

    let span = info_span!("vault.renew_token", http.method = "POST", url = %renew_url);
    let response = vault::client()?
        .post(&renew_url)
        .json(&json!({ "increment": 0 }))
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    vault::response_json(&renew_url, response)
        .await?
        .get("auth")
        .and_then(|auth| auth.get("lease_duration"))
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}

/// Renew the database credentials lease, returns the new lease duration.
#[instrument(skip(token))]
async fn renew_db_lease(
    url: &str,
    token: &SecretString,
    lease_id: &str,
    increment: u64,
) -> Result<u64> {
    let renew_url = vault::endpoint_url(url, "/v1/sys/leases/renew")?;

    let span = info_span!("vault.renew_db_lease", http.method = "POST", url = %renew_url);
    let response = vault::client()?
        .post(&renew_url)
        .json(&json!({ "increment": increment, "lease_id": lease_id }))
        .header("X-Vault-Token", token.expose_secret())
        .send()
        .instrument(span)
        .await?;

    vault::response_json(&renew_url, response)
        .await?
        .get("lease_duration")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("Error parsing JSON response: no lease_duration found"))
}

/// Keep calling `renew` before each lease runs out. After three failed
/// attempts in a row the loop signals `tx` and stops.
async fn renew_loop<F, Fut>(what: &'static str, tx: mpsc::UnboundedSender<()>, mut renew: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<u64>>,
{
    let mut rng = StdRng::from_entropy();

    loop {
        let mut next = Duration::default();

        for attempt in 1..=RENEW_ATTEMPTS {
            if attempt > 1 {
                let backoff_time = 2u64.pow(attempt - 1);
                warn!("Backing off for {} seconds", backoff_time);
                sleep(Duration::from_secs(backoff_time)).await;
            }

            match renew().await {
                Ok(lease_duration) => {
                    let factor = rng.gen_range(70..90);
                    next = Duration::from_secs(lease_duration * factor / 100);
                    info!(
                        lease_duration,
                        next_renew_seconds = next.as_secs(),
                        "Vault {} renewed",
                        what
                    );
                    break;
                }

                Err(e) => {
                    error!("Failed to renew {}: {}", what, e);

                    if attempt == RENEW_ATTEMPTS {
                        error!("Failed to renew {} after {} attempts", what, RENEW_ATTEMPTS);
                        let _ = tx.send(());
                        return;
                    }
                }
            }
        }

        debug!("Will renew {} in {} seconds", what, next.as_secs());

        sleep(next).await;
    }
}

/// Spawn the renewal loops for the Vault token and the database lease.
/// A loop that gives up sends on `tx` so the server can shut down.
///
/// # Errors
/// Currently infallible; kept as `Result` for the caller's `?`.
#[instrument(skip(globals, tx))]
pub async fn try_renew(globals: &GlobalArgs, tx: mpsc::UnboundedSender<()>) -> Result<()> {
    tokio::spawn({
        let url = globals.vault_url.clone();
        let token = globals.vault_token.clone();
        let tx = tx.clone();

        async move {
            renew_loop("token", tx, || renew_token(&url, &token)).await;
        }
    });

    tokio::spawn({
        let url = globals.vault_url.clone();
        let token = globals.vault_token.clone();
        let lease_id = globals.vault_db_lease_id.clone();
        let increment = globals.vault_db_lease_duration;

        async move {
            renew_loop("DB lease", tx, || {
                renew_db_lease(&url, &token, &lease_id, increment)
            })
            .await;
        }
    });

    Ok(())
}
