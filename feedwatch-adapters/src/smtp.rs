//! Outbound email over SMTP.
//!
//! Port 465 uses implicit TLS. Every other port starts in plaintext and
//! upgrades with STARTTLS when the server offers it; if the upgrade itself
//! fails, the message is sent unencrypted rather than dropped.

use std::time::Duration;

use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, warn};

use crate::AdapterError;

pub const IMPLICIT_TLS_PORT: u16 = 465;

/// How the connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS).
    Implicit,
    /// Plaintext, upgraded with STARTTLS when possible.
    StartTls,
}

impl TlsMode {
    pub fn for_port(port: u16) -> Self {
        if port == IMPLICIT_TLS_PORT {
            TlsMode::Implicit
        } else {
            TlsMode::StartTls
        }
    }
}

/// Connection and addressing settings for the mailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub sender: String,
    pub recipients: Vec<String>,
    pub timeout: Duration,
}

impl SmtpSettings {
    fn credentials(&self) -> Option<Credentials> {
        (!self.username.is_empty() && !self.password.is_empty())
            .then(|| Credentials::new(self.username.clone(), self.password.clone()))
    }
}

/// Sends plain-text alert emails.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    settings: SmtpSettings,
}

impl SmtpMailer {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SmtpSettings {
        &self.settings
    }

    /// Build the message. Fails when there is no recipient.
    pub fn build_message(&self, subject: &str, body: &str) -> Result<Message, AdapterError> {
        let recipients: Vec<&str> = self
            .settings
            .recipients
            .iter()
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .collect();
        if recipients.is_empty() {
            return Err(AdapterError::Config("no email recipients configured".to_string()));
        }

        let mut builder = Message::builder()
            .from(parse_mailbox(&self.settings.sender)?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in recipients {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        builder
            .body(body.to_string())
            .map_err(|e| AdapterError::Notify(format!("could not build message: {}", e)))
    }

    /// Send one message to every recipient.
    pub async fn send(&self, subject: &str, body: &str) -> Result<(), AdapterError> {
        let message = self.build_message(subject, body)?;

        match TlsMode::for_port(self.settings.port) {
            TlsMode::Implicit => {
                let tls = Tls::Wrapper(self.tls_parameters()?);
                self.transport(tls).send(message).await.map_err(send_error)?;
            }
            TlsMode::StartTls => {
                let tls = Tls::Opportunistic(self.tls_parameters()?);
                match self.transport(tls).send(message.clone()).await {
                    Ok(_) => {}
                    Err(err) if starttls_refused(&err) => {
                        warn!(
                            server = %self.settings.server,
                            error = %err,
                            "STARTTLS negotiation failed, sending unencrypted"
                        );
                        self.transport(Tls::None)
                            .send(message)
                            .await
                            .map_err(send_error)?;
                    }
                    Err(err) => return Err(send_error(err)),
                }
            }
        }

        info!(
            server = %self.settings.server,
            recipients = self.settings.recipients.len(),
            "Email sent"
        );
        Ok(())
    }

    fn tls_parameters(&self) -> Result<TlsParameters, AdapterError> {
        TlsParameters::new(self.settings.server.clone())
            .map_err(|e| AdapterError::Config(format!("invalid TLS setup: {}", e)))
    }

    fn transport(&self, tls: Tls) -> AsyncSmtpTransport<Tokio1Executor> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.settings.server)
                .port(self.settings.port)
                .tls(tls)
                .timeout(Some(self.settings.timeout));
        if let Some(credentials) = self.settings.credentials() {
            builder = builder.credentials(credentials);
        }
        builder.build()
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, AdapterError> {
    address
        .trim()
        .parse()
        .map_err(|e| AdapterError::Config(format!("invalid email address '{}': {}", address, e)))
}

/// Reply code a server sends when it advertised STARTTLS but cannot start it.
const TLS_NOT_AVAILABLE: &str = "454";

/// Whether the STARTTLS upgrade failed, either in the TLS handshake or by the
/// server refusing the command.
fn starttls_refused(err: &lettre::transport::smtp::Error) -> bool {
    err.is_tls()
        || (err.is_transient()
            && err
                .status()
                .is_some_and(|code| code.to_string() == TLS_NOT_AVAILABLE))
}

fn send_error(err: lettre::transport::smtp::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout
    } else {
        AdapterError::Notify(format!("SMTP send failed: {}", err))
    }
}
