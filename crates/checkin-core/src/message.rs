//! Check-in message composition
//!
//! Every notifier sends the same text; only the transport differs.

/// Subject line of every check-in
pub const CHECK_IN_SUBJECT: &str = "How are you?";

/// Greeting used when the subscriber gave no name
const FALLBACK_NAME: &str = "there";

/// A composed check-in message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInMessage {
    pub subject: String,
    pub body: String,
}

impl CheckInMessage {
    /// Compose the check-in for a subscriber
    ///
    /// A missing or blank display name falls back to "there".
    pub fn compose(display_name: Option<&str>) -> Self {
        let name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(FALLBACK_NAME);

        Self {
            subject: CHECK_IN_SUBJECT.to_string(),
            body: format!(
                "Hi {},\n\nJust checking in. How are you doing today?\n\n\
                 Reply to this email or click below to check in.",
                name
            ),
        }
    }
}
