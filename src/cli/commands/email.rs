use anyhow::{Context, Result};
use clap::{parser::ValueSource, Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_EMAIL_WEBHOOK_URL: &str = "email-webhook-url";
pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";

/// SMTP relay login.
#[derive(Debug)]
pub struct SmtpOptions {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    /// `--email-from` when given, the SMTP username otherwise.
    pub from: String,
}

#[derive(Debug)]
pub struct Options {
    pub smtp: Option<SmtpOptions>,
    /// Mail relay endpoint; codes are only logged when neither this nor SMTP is set.
    pub webhook_url: Option<String>,
    pub from: String,
}

impl Options {
    /// # Errors
    /// Returns an error if the sender address or part of the SMTP login is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let from = matches
            .get_one::<String>(ARG_EMAIL_FROM)
            .cloned()
            .context("missing required argument: --email-from")?;

        let smtp = match matches.get_one::<String>(ARG_SMTP_HOST) {
            Some(host) => {
                let username = matches
                    .get_one::<String>(ARG_SMTP_USERNAME)
                    .cloned()
                    .context("missing required argument: --smtp-username")?;
                let password = matches
                    .get_one::<String>(ARG_SMTP_PASSWORD)
                    .map(|value| SecretString::from(value.clone()))
                    .context("missing required argument: --smtp-password")?;
                let explicit_from = !matches!(
                    matches.value_source(ARG_EMAIL_FROM),
                    None | Some(ValueSource::DefaultValue)
                );

                Some(SmtpOptions {
                    host: host.clone(),
                    port: matches
                        .get_one::<u16>(ARG_SMTP_PORT)
                        .copied()
                        .context("missing required argument: --smtp-port")?,
                    from: if explicit_from {
                        from.clone()
                    } else {
                        username.clone()
                    },
                    username,
                    password,
                })
            }
            None => None,
        };

        Ok(Self {
            smtp,
            webhook_url: matches.get_one::<String>(ARG_EMAIL_WEBHOOK_URL).cloned(),
            from,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_smtp_args(command);
    command
        .arg(
            Arg::new(ARG_EMAIL_WEBHOOK_URL)
                .long(ARG_EMAIL_WEBHOOK_URL)
                .help("HTTP mail relay receiving {from, to, subject, body} JSON")
                .env("OTPGATE_EMAIL_WEBHOOK_URL")
                .conflicts_with(ARG_SMTP_HOST)
                .value_parser(clap::builder::NonEmptyStringValueParser::new()),
        )
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address of outbound email")
                .env("OTPGATE_EMAIL_FROM")
                .default_value("no-reply@otpgate.local"),
        )
}

fn with_smtp_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host, also the TLS server name")
                .env("OTPGATE_SMTP_HOST")
                .requires(ARG_SMTP_USERNAME)
                .requires(ARG_SMTP_PASSWORD)
                .value_parser(clap::builder::NonEmptyStringValueParser::new()),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port, 465 for implicit TLS, STARTTLS otherwise")
                .env("OTPGATE_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16).range(1..)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP login, used as sender address unless --email-from is given")
                .env("OTPGATE_SMTP_USERNAME")
                .requires(ARG_SMTP_HOST),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("OTPGATE_SMTP_PASSWORD")
                .hide_env_values(true)
                .requires(ARG_SMTP_HOST),
        )
}
