//! Primary transport: SMTP email.
//!
//! [`EmailTransport`] wraps the `lettre` async SMTP transport and sends one
//! plain-text message per recipient. Configuration is loaded from
//! environment variables; if `SMTP_HOST` is not set,
//! [`EmailConfig::from_env`] returns `None` and no transport should be
//! constructed.

use async_trait::async_trait;
use lettre::address::AddressError;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::{AlertMessage, PrimaryReceipt, PrimaryTransport, TransportError};

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "alerts@damwatch.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable        | Required | Default                  |
    /// |-----------------|----------|--------------------------|
    /// | `SMTP_HOST`     | yes      | none                     |
    /// | `SMTP_PORT`     | no       | `587`                    |
    /// | `SMTP_FROM`     | no       | `alerts@damwatch.local`  |
    /// | `SMTP_USER`     | no       | none                     |
    /// | `SMTP_PASSWORD` | no       | none                     |
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST").ok()?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

// ---------------------------------------------------------------------------
// EmailTransport
// ---------------------------------------------------------------------------

/// Why a single recipient could not be mailed.
#[derive(Debug)]
enum RecipientFailure {
    /// Will not succeed on retry (bad address, 5xx reply).
    Permanent(String),
    Transient(String),
}

pub struct EmailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailTransport {
    /// Build the SMTP transport. No connection is opened until the first send.
    pub fn new(config: EmailConfig) -> Result<Self, TransportError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| TransportError::NotConfigured(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (config.smtp_user, config.smtp_password) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        config
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| TransportError::NotConfigured(format!("SMTP_FROM: {e}")))?;

        Ok(Self {
            mailer: builder.build(),
            from_address: config.from_address,
        })
    }

    async fn send_one(&self, to: &str, message: &AlertMessage) -> Result<(), RecipientFailure> {
        let from: Mailbox = self
            .from_address
            .parse()
            .map_err(|e: AddressError| RecipientFailure::Permanent(e.to_string()))?;
        let to_mailbox: Mailbox = to
            .parse()
            .map_err(|e: AddressError| RecipientFailure::Permanent(format!("{to}: {e}")))?;

        let email = Message::builder()
            .from(from)
            .to(to_mailbox)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| RecipientFailure::Permanent(e.to_string()))?;

        self.mailer.send(email).await.map(|_| ()).map_err(|e| {
            if e.is_permanent() {
                RecipientFailure::Permanent(format!("{to}: {e}"))
            } else {
                RecipientFailure::Transient(format!("{to}: {e}"))
            }
        })
    }
}

#[async_trait]
impl PrimaryTransport for EmailTransport {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, message: &AlertMessage) -> Result<PrimaryReceipt, TransportError> {
        let results = futures::future::join_all(
            message
                .recipients
                .iter()
                .map(|to| self.send_one(to, message)),
        )
        .await;

        let total = results.len();
        let mut failures = Vec::new();
        for result in results {
            if let Err(failure) = result {
                failures.push(failure);
            }
        }
        let delivered = total - failures.len();

        for failure in &failures {
            tracing::warn!(rule_key = %message.rule_key, failure = ?failure, "Alert email not delivered");
        }

        if delivered > 0 {
            tracing::info!(rule_key = %message.rule_key, delivered, total, "Alert email sent");
            return Ok(PrimaryReceipt::verified(Some(format!(
                "{delivered}/{total} delivered"
            ))));
        }

        let all_permanent = failures
            .iter()
            .all(|f| matches!(f, RecipientFailure::Permanent(_)));
        let summary = failures
            .iter()
            .map(|f| match f {
                RecipientFailure::Permanent(m) | RecipientFailure::Transient(m) => m.as_str(),
            })
            .collect::<Vec<_>>()
            .join("; ");

        if all_permanent {
            Err(TransportError::Rejected(summary))
        } else {
            Err(TransportError::Unreachable(summary))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
