use crate::{
    api,
    auth::AuthConfig,
    cli::{
        commands::{auth, email, vault as vault_args},
        globals::GlobalArgs,
        telemetry,
    },
    email::{EmailSender, LogEmailSender, SmtpEmailSender, WebhookEmailSender},
    token::TokenManager,
    vault,
};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: String,
    pub vault: Option<vault_args::Options>,
    pub auth: auth::Options,
    pub email: email::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if Vault login fails, secrets cannot be resolved, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let mut dsn = args.dsn;
    let mut globals = None;

    let (access_secret, refresh_secret) = if let Some(opts) = &args.vault {
        let mut session = login(opts).await?;

        // Get database username and password from Vault
        vault::database::database_creds(&mut session)
            .await
            .context("Could not get database username and password")?;

        debug!("Global args: {:?}", session);

        dsn = with_db_credentials(&dsn, &session)?;

        let secrets = match (
            args.auth.access_token_secret.clone(),
            args.auth.refresh_token_secret.clone(),
        ) {
            (Some(access), Some(refresh)) => (access, refresh),
            _ => vault::kv::read_token_secrets(&session, &opts.kv_mount, &opts.kv_path)
                .await
                .context("Could not read token secrets")?,
        };

        globals = Some(session);
        secrets
    } else {
        (
            args.auth
                .access_token_secret
                .clone()
                .context("missing required argument: --access-token-secret")?,
            args.auth
                .refresh_token_secret
                .clone()
                .context("missing required argument: --refresh-token-secret")?,
        )
    };

    let tokens = TokenManager::new(&access_secret, &refresh_secret)?;

    let auth_config = AuthConfig::new()
        .with_access_token_ttl_seconds(args.auth.access_token_ttl_seconds)
        .with_refresh_token_ttl_seconds(args.auth.refresh_token_ttl_seconds)
        .with_otp_ttl_seconds(args.auth.otp_ttl_seconds)
        .with_request_timeout_seconds(args.auth.request_timeout_seconds);

    let sender = email_sender(args.email)?;

    let result = api::new(
        args.port,
        dsn,
        args.redis_url,
        globals.as_ref(),
        tokens,
        auth_config,
        sender,
    )
    .await;

    telemetry::shutdown_tracer();

    result
}

/// SMTP when a relay host is set, then the JSON webhook, then the log.
fn email_sender(opts: email::Options) -> Result<Arc<dyn EmailSender>> {
    if let Some(smtp) = opts.smtp {
        info!(host = %smtp.host, port = smtp.port, "sending email over SMTP");
        return Ok(Arc::new(SmtpEmailSender::new(
            &smtp.host,
            smtp.port,
            &smtp.username,
            &smtp.password,
            &smtp.from,
        )?));
    }

    match opts.webhook_url {
        Some(url) => Ok(Arc::new(WebhookEmailSender::new(url, opts.from)?)),
        None => {
            warn!("No email relay configured, one-time codes are only logged");
            Ok(Arc::new(LogEmailSender))
        }
    }
}

/// Log in with `AppRole`, unwrapping the secret id first when it was handed over wrapped.
async fn login(opts: &vault_args::Options) -> Result<GlobalArgs> {
    let mut globals = GlobalArgs::new(opts.url.clone());

    let secret_id = if let Some(wrapped) = &opts.wrapped_token {
        vault::unwrap(&globals.vault_url, wrapped).await?
    } else {
        opts.secret_id
            .clone()
            .ok_or_else(|| anyhow!("Vault secret-id is required"))?
    };

    let (token, _) = vault::approle_login(&globals.vault_url, &secret_id, &opts.role_id).await?;

    globals.set_token(SecretString::from(token));

    Ok(globals)
}

/// Replace the DSN credentials with the dynamic ones leased from Vault.
fn with_db_credentials(dsn: &str, globals: &GlobalArgs) -> Result<String> {
    let mut dsn = Url::parse(dsn).context("Invalid database DSN")?;

    dsn.set_username(&globals.vault_db_username)
        .map_err(|()| anyhow!("Error setting username"))?;

    dsn.set_password(Some(globals.vault_db_password.expose_secret()))
        .map_err(|()| anyhow!("Error setting password"))?;

    Ok(dsn.to_string())
}
