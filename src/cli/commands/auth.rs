use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_ACCESS_TOKEN_SECRET: &str = "access-token-secret";
pub const ARG_REFRESH_TOKEN_SECRET: &str = "refresh-token-secret";
pub const ARG_ACCESS_TOKEN_TTL: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL: &str = "refresh-token-ttl-seconds";
pub const ARG_OTP_TTL: &str = "otp-ttl-seconds";
pub const ARG_REQUEST_TIMEOUT: &str = "request-timeout-seconds";

/// Token signing and lifetime settings.
#[derive(Debug)]
pub struct Options {
    pub access_token_secret: Option<SecretString>,
    pub refresh_token_secret: Option<SecretString>,
    pub access_token_ttl_seconds: u64,
    pub refresh_token_ttl_seconds: u64,
    pub otp_ttl_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Options {
    /// # Errors
    /// Returns an error if a lifetime argument is missing
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let secret = |name: &str| {
            matches
                .get_one::<String>(name)
                .map(|value| SecretString::from(value.clone()))
        };
        let seconds = |name: &str| {
            matches
                .get_one::<u64>(name)
                .copied()
                .with_context(|| format!("missing required argument: --{name}"))
        };

        Ok(Self {
            access_token_secret: secret(ARG_ACCESS_TOKEN_SECRET),
            refresh_token_secret: secret(ARG_REFRESH_TOKEN_SECRET),
            access_token_ttl_seconds: seconds(ARG_ACCESS_TOKEN_TTL)?,
            refresh_token_ttl_seconds: seconds(ARG_REFRESH_TOKEN_TTL)?,
            otp_ttl_seconds: seconds(ARG_OTP_TTL)?,
            request_timeout_seconds: seconds(ARG_REQUEST_TIMEOUT)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_secret_args(command);
    with_lifetime_args(command)
}

fn with_secret_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_SECRET)
                .long(ARG_ACCESS_TOKEN_SECRET)
                .help("HMAC key for access tokens (read from Vault KV when --vault-url is set)")
                .env("OTPGATE_ACCESS_TOKEN_SECRET")
                .hide_env_values(true)
                .required_unless_present("vault-url"),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_SECRET)
                .long(ARG_REFRESH_TOKEN_SECRET)
                .help("HMAC key for refresh tokens (read from Vault KV when --vault-url is set)")
                .env("OTPGATE_REFRESH_TOKEN_SECRET")
                .hide_env_values(true)
                .required_unless_present("vault-url"),
        )
}

fn with_lifetime_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL)
                .long(ARG_ACCESS_TOKEN_TTL)
                .help("Access token TTL in seconds")
                .env("OTPGATE_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL)
                .long(ARG_REFRESH_TOKEN_TTL)
                .help("Refresh token TTL in seconds")
                .env("OTPGATE_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_OTP_TTL)
                .long(ARG_OTP_TTL)
                .help("Lifetime of a mailed one-time code in seconds")
                .env("OTPGATE_OTP_TTL_SECONDS")
                .default_value("180")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REQUEST_TIMEOUT)
                .long(ARG_REQUEST_TIMEOUT)
                .help("Deadline for a single auth flow in seconds")
                .env("OTPGATE_REQUEST_TIMEOUT_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
