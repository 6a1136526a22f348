// # Record Store Trait
//
// Defines the durable medium holding every subscriber record.
//
// ## Purpose
//
// The record store is a whole-mapping medium: `load` returns a full snapshot
// and `save` commits a full mapping. There is no per-record write. The
// read-modify-write discipline (single commit lock around snapshot → mutate
// → persist) lives in `SubscriberStore`, not in the backends.
//
// ## Implementations
//
// - File-based: JSON file with atomic replace (`FileRecordStore`)
// - In-memory: tests and throwaway deployments (`MemoryRecordStore`)
//
// ## Usage
//
// ```rust,ignore
// use checkin_core::RecordStore;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let store = /* RecordStore implementation */;
//
//     let mut subscribers = store.load().await?;
//     // ... mutate ...
//     store.save(&subscribers).await?;
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Largest accepted cadence (100 years)
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

/// Opaque, random subscriber identifier
///
/// Generated from a v4 UUID so ids are not sequential or guessable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for SubscriberId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| Error::not_found(s.to_string()))
    }
}

/// Full subscriber mapping, keyed by id
///
/// Ordered so that the persisted file is stable across commits.
pub type SubscriberMap = BTreeMap<SubscriberId, SubscriberRecord>;

/// Persisted state for one subscriber
///
/// The id is the mapping key and is not repeated inside the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberRecord {
    /// Encrypted contact address (cipher token)
    pub contact_ciphertext: String,

    /// Optional plaintext name used in the greeting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Days between check-ins (>= 1)
    pub interval_days: u32,

    /// Next instant this subscriber becomes due
    pub next_due_at: DateTime<Utc>,

    /// When the record was registered
    #[serde(default)]
    pub created_at: DateTime<Utc>,

    /// Instant of the most recent check-in delivery attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_delivered_at: Option<DateTime<Utc>>,
}

impl SubscriberRecord {
    /// Whether the record is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_due_at <= now
    }

    /// Move the due time forward from the delivery instant
    ///
    /// The new due time is `delivered_at + interval`, never computed from the
    /// old due time, so a late sweep does not accumulate drift.
    pub fn advance(&mut self, delivered_at: DateTime<Utc>) -> Result<()> {
        self.next_due_at = due_after(delivered_at, self.interval_days)?;
        self.last_delivered_at = Some(delivered_at);
        Ok(())
    }
}

/// Compute `from + interval_days` without overflowing
pub(crate) fn due_after(from: DateTime<Utc>, interval_days: u32) -> Result<DateTime<Utc>> {
    from.checked_add_signed(Duration::days(i64::from(interval_days.max(1))))
        .ok_or_else(|| Error::invalid_input("next due time is out of range"))
}

/// Normalize a caller-supplied cadence
///
/// Missing or non-positive values become 1. Values above
/// [`MAX_INTERVAL_DAYS`] are rejected.
pub fn normalize_interval_days(raw: Option<i64>) -> Result<u32> {
    match raw {
        None => Ok(1),
        Some(days) if days <= 0 => Ok(1),
        Some(days) if days > i64::from(MAX_INTERVAL_DAYS) => Err(Error::invalid_input(format!(
            "interval_days must be at most {}, got {}",
            MAX_INTERVAL_DAYS, days
        ))),
        Some(days) => Ok(days as u32),
    }
}

/// Input for registering a subscriber
#[derive(Clone, Default)]
pub struct NewSubscriber {
    /// Plaintext contact address (encrypted before it is stored)
    pub contact: String,
    /// Optional name for the greeting
    pub display_name: Option<String>,
    /// Requested cadence; defaults to 1 when unset or non-positive
    pub interval_days: Option<i64>,
}

impl NewSubscriber {
    /// Create a registration with default cadence
    pub fn new(contact: impl Into<String>) -> Self {
        Self {
            contact: contact.into(),
            display_name: None,
            interval_days: None,
        }
    }

    /// Set the display name
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set the cadence
    pub fn with_interval_days(mut self, days: i64) -> Self {
        self.interval_days = Some(days);
        self
    }
}

impl fmt::Debug for NewSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSubscriber")
            .field("contact", &"<REDACTED>")
            .field("display_name", &self.display_name)
            .field("interval_days", &self.interval_days)
            .finish()
    }
}

/// Partial update of an existing subscriber
#[derive(Clone, Default)]
pub struct SubscriberUpdate {
    /// New plaintext contact address (re-encrypted when present)
    pub contact: Option<String>,
    /// New cadence; ignored unless positive
    pub interval_days: Option<i64>,
}

impl SubscriberUpdate {
    /// Replace the contact address
    pub fn contact(mut self, contact: impl Into<String>) -> Self {
        self.contact = Some(contact.into());
        self
    }

    /// Replace the cadence
    pub fn interval_days(mut self, days: i64) -> Self {
        self.interval_days = Some(days);
        self
    }
}

impl fmt::Debug for SubscriberUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberUpdate")
            .field("contact", &self.contact.as_ref().map(|_| "<REDACTED>"))
            .field("interval_days", &self.interval_days)
            .finish()
    }
}

/// Trait for record store implementations
///
/// Implementations must be thread-safe and usable across async tasks.
///
/// # Trust Level: Trusted (Core Component)
///
/// ## Allowed Capabilities
/// - ✅ Perform I/O for persistent storage
/// - ✅ Serialize commits to the medium internally
///
/// ## Forbidden Capabilities
/// - ❌ Decide due-ness or mutate records (owned by `Scheduler` / `SubscriberStore`)
/// - ❌ Decrypt contacts (owned by `Cipher`)
/// - ❌ Spawn background tasks
///
/// ## Implementation Guidelines
///
/// - **Atomic commit**: `save` replaces the whole mapping or nothing; a crash
///   mid-save must leave the previously committed mapping loadable
/// - **Empty on first run**: a medium that does not exist yet loads as empty
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Read a full snapshot of the mapping
    ///
    /// # Returns
    ///
    /// - `Ok(SubscriberMap)`: The committed mapping (empty on first run)
    /// - `Err(Error::StoreIo)`: The medium is unreadable
    async fn load(&self) -> Result<SubscriberMap>;

    /// Atomically replace the committed mapping
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The new mapping is durable
    /// - `Err(Error::StoreIo)`: Nothing was committed; the previous mapping stands
    async fn save(&self, subscribers: &SubscriberMap) -> Result<()>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
