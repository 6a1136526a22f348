// # SMTP Notifier
//
// This crate delivers check-in messages as plain-text e-mail over SMTP.
//
// ## Behavior
//
// - One SMTP transaction per `deliver` call
// - Implicit TLS when `secure` is set (usually port 465), STARTTLS otherwise
// - Transport timeout configured (30 seconds); the scheduler applies its own
//   delivery timeout on top
// - Dry-run mode builds the message and logs it, but never connects
// - No retries, no queueing: a failed delivery is reported to the scheduler,
//   which applies its failure policy
//
// ## Trust Level: Untrusted (Notifier)
//
// **Allowed Capabilities**:
// - ✅ Connect to the configured SMTP relay only
// - ✅ Compose the message from `CheckInMessage`
//
// **Forbidden Capabilities**:
// - ❌ Spawn tasks or threads
// - ❌ Retry or back off (owned by the scheduler's failure policy)
// - ❌ Access the record store
//
// ## Security Requirements
//
// - The sender password NEVER appears in logs or Debug output
// - The recipient address NEVER appears in logs or error messages

use anyhow::Context;
use async_trait::async_trait;
use checkin_core::config::NotifierConfig;
use checkin_core::message::CheckInMessage;
use checkin_core::traits::{Contact, Notifier};
use checkin_core::{Error, Result};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

/// Display name used in the From header when none is configured
pub const DEFAULT_SENDER_NAME: &str = "In Case I Die";

/// Default SMTP transport timeout (30 seconds)
const DEFAULT_SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// SMTP e-mail notifier
///
/// # Dry-Run Mode
///
/// When `dry_run` is true, the notifier will:
/// - Parse the recipient and build the full message
/// - Log the subject and relay it would have used
/// - **NOT** open a connection to the relay
pub struct SmtpNotifier {
    /// Pooled async transport (holds the credentials)
    transport: AsyncSmtpTransport<Tokio1Executor>,

    /// From header mailbox
    from: Mailbox,

    host: String,
    port: u16,
    secure: bool,

    /// Dry-run mode: build messages but never send
    dry_run: bool,
}

// Custom Debug implementation that hides the transport and its credentials
impl std::fmt::Debug for SmtpNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpNotifier")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("from", &self.from.to_string())
            .field("sender_password", &"<REDACTED>")
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl SmtpNotifier {
    /// Create an SMTP notifier from the notifier configuration
    ///
    /// The configuration is validated first. No connection is made until the
    /// first delivery.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is not SMTP, is invalid,
    /// or names a relay that cannot be used for TLS.
    pub fn from_config(config: &NotifierConfig, dry_run: bool) -> Result<Self> {
        config.validate()?;

        let NotifierConfig::Smtp {
            host,
            port,
            secure,
            sender_email,
            sender_password,
            sender_name,
        } = config
        else {
            return Err(Error::config(format!(
                "SMTP notifier cannot be built from '{}' notifier config",
                config.type_name()
            )));
        };

        let address: Address = sender_email
            .trim()
            .parse()
            .map_err(|e| Error::config(format!("Invalid sender email: {}", e)))?;
        let name = sender_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_SENDER_NAME);
        let from = Mailbox::new(Some(name.to_string()), address);

        let builder = if *secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|e| Error::config(format!("Invalid SMTP relay {}: {}", host, e)))?;

        let transport = builder
            .port(*port)
            .credentials(Credentials::new(
                sender_email.trim().to_string(),
                sender_password.clone(),
            ))
            .timeout(Some(DEFAULT_SMTP_TIMEOUT))
            .build();

        if dry_run {
            tracing::warn!("SMTP notifier running in DRY-RUN mode - no mail will be sent");
        }

        Ok(Self {
            transport,
            from,
            host: host.clone(),
            port: *port,
            secure: *secure,
            dry_run,
        })
    }

    /// Whether this notifier only logs instead of sending
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Build the check-in e-mail for one recipient
    fn build_message(&self, contact: &Contact, display_name: Option<&str>) -> anyhow::Result<Message> {
        // The parse error never includes the address itself
        let to: Mailbox = contact
            .as_str()
            .parse()
            .context("invalid recipient address")?;

        let composed = CheckInMessage::compose(display_name);
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(composed.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(composed.body)
            .context("failed to build check-in message")
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn deliver(&self, contact: &Contact, display_name: Option<&str>) -> Result<()> {
        let message = self
            .build_message(contact, display_name)
            .map_err(|e| Error::delivery("smtp", format!("{:#}", e)))?;

        if self.dry_run {
            tracing::info!(
                "[DRY-RUN] Would send check-in via {}:{} ({} bytes)",
                self.host,
                self.port,
                message.formatted().len()
            );
            return Ok(());
        }

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| Error::delivery("smtp", format!("send via {} failed: {}", self.host, e)))?;

        tracing::debug!("SMTP relay {} accepted check-in: {}", self.host, response.code());
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "smtp"
    }
}
