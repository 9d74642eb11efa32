//! Outbound email delivery.
//!
//! One-time codes and IP-change notices go out through an [`EmailSender`].
//! Delivery is synchronous from the caller's point of view: the sender
//! returns only after the relay accepted (or refused) the message, so the
//! auth flows can decide what a failed send means for the request.
//!
//! The default sender for local dev is [`LogEmailSender`]. Production setups
//! either log in to an SMTP relay (`--smtp-host`) or point
//! `--email-webhook-url` at a mail relay that accepts JSON.
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info, info_span, Instrument};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

/// Email delivery abstraction used by the OTP issuer and the refresh flow.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error describing why it was not accepted.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            "email send stub"
        );
        debug!(body = %message.body, "email send stub body");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Hands messages to an HTTP mail relay as JSON.
#[derive(Clone, Debug)]
pub struct WebhookEmailSender {
    client: Client,
    url: String,
    from: String,
}

impl WebhookEmailSender {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: String, from: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()
            .context("failed to build email webhook client")?;
        Ok(Self { client, url, from })
    }
}

#[async_trait]
impl EmailSender for WebhookEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload = WebhookPayload {
            from: &self.from,
            to: &message.to_email,
            subject: &message.subject,
            body: &message.body,
        };

        let span = info_span!("email.send", http.method = "POST", url = %self.url);
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .instrument(span)
            .await
            .context("email relay request failed")?
            .error_for_status()
            .context("email relay rejected message")?;

        Ok(())
    }
}

/// Implicit TLS port; every other port negotiates STARTTLS.
pub const SMTPS_PORT: u16 = 465;

/// Delivers plain text mail through an authenticated SMTP relay.
pub struct SmtpEmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
    from: Mailbox,
}

impl SmtpEmailSender {
    /// Build a pooled transport for `host:port` using PLAIN auth. The TLS
    /// server name is `host`.
    ///
    /// # Errors
    /// Returns an error if the TLS parameters for `host` cannot be built or
    /// `from` is not a valid address.
    pub fn new(
        host: &str,
        port: u16,
        username: &str,
        password: &SecretString,
        from: &str,
    ) -> Result<Self> {
        let builder = if port == SMTPS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .with_context(|| format!("invalid SMTP host: {host}"))?;

        let transport = builder
            .port(port)
            .credentials(Credentials::new(
                username.to_string(),
                password.expose_secret().to_string(),
            ))
            .authentication(vec![Mechanism::Plain])
            .build();

        let from = from
            .parse::<Mailbox>()
            .with_context(|| format!("invalid sender address: {from}"))?;

        Ok(Self {
            transport,
            host: host.to_string(),
            from,
        })
    }
}

fn smtp_message(from: &Mailbox, message: &EmailMessage) -> Result<Message> {
    let to = message
        .to_email
        .parse::<Mailbox>()
        .with_context(|| format!("invalid recipient address: {}", message.to_email))?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(message.subject.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .context("failed to build email")
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = smtp_message(&self.from, message)?;

        let span = info_span!("email.send", smtp.host = %self.host);
        self.transport
            .send(email)
            .instrument(span)
            .await
            .context("SMTP relay rejected message")?;

        Ok(())
    }
}
