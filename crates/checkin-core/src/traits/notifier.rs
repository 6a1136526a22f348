// # Notifier Trait
//
// Defines the interface for delivering a check-in message to a subscriber.
//
// ## Implementations
//
// - SMTP e-mail: `checkin-notifier-smtp` crate
// - Logging only: [`LogNotifier`] (no outbound traffic)
//
// ## Usage
//
// ```rust,ignore
// use checkin_core::{Contact, Notifier};
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let notifier = /* Notifier implementation */;
//
//     notifier.deliver(&Contact::new("a@x.com"), Some("Ada")).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::message::CheckInMessage;

/// A decrypted contact address
///
/// Lives only for the duration of one delivery. The buffer is wiped on drop
/// and the Debug output never shows the address.
pub struct Contact(Zeroizing<String>);

impl Contact {
    /// Wrap a plaintext contact address
    pub fn new(address: impl Into<String>) -> Self {
        Self(Zeroizing::new(address.into()))
    }

    /// The plaintext address
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<Zeroizing<String>> for Contact {
    fn from(value: Zeroizing<String>) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for Contact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Contact(<REDACTED>)")
    }
}

/// Trait for check-in delivery implementations
///
/// # Thread Safety
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Untrusted
///
/// Notifiers are external integrations with strict limitations:
///
/// ## Allowed Capabilities
/// - ✅ Talk to their own transport (SMTP relay, API endpoint)
/// - ✅ Compose the outbound message from [`CheckInMessage`]
/// - ✅ Return success or failure (the scheduler owns the failure policy)
///
/// ## Forbidden Capabilities
/// - ❌ Access the record store (owned by `Scheduler`)
/// - ❌ Retry or back off (a failed delivery waits for its next due cycle)
/// - ❌ Log or persist the plaintext contact
/// - ❌ Spawn tasks that outlive the call
///
/// The scheduler bounds every call with its delivery timeout; an elapsed
/// timeout is treated the same as a returned error.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one check-in message
    ///
    /// # Parameters
    ///
    /// - `contact`: The decrypted contact address
    /// - `display_name`: Optional name used to personalize the greeting
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The transport accepted the message
    /// - `Err(Error::Delivery)`: The transport rejected it or was unreachable
    async fn deliver(&self, contact: &Contact, display_name: Option<&str>)
    -> Result<(), crate::Error>;

    /// Get the notifier name (for logging/debugging)
    fn notifier_name(&self) -> &'static str;
}

/// Notifier that only logs what would have been sent
///
/// Used for dry runs and for deployments without outbound transport. The
/// contact address is never written to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(
        &self,
        _contact: &Contact,
        display_name: Option<&str>,
    ) -> Result<(), crate::Error> {
        let message = CheckInMessage::compose(display_name);
        tracing::info!(
            "[log notifier] would send check-in '{}' ({} bytes)",
            message.subject,
            message.body.len()
        );
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_debug_redacted() {
        let contact = Contact::new("a@x.com");
        assert_eq!(format!("{:?}", contact), "Contact(<REDACTED>)");
        assert_eq!(contact.as_str(), "a@x.com");
    }

    #[tokio::test]
    async fn test_log_notifier_accepts() {
        let notifier = LogNotifier;
        notifier
            .deliver(&Contact::new("a@x.com"), None)
            .await
            .unwrap();
        assert_eq!(notifier.notifier_name(), "log");
    }
}
