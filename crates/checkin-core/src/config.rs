//! Configuration types for the check-in system
//!
//! This module defines all configuration structures used throughout the crate.
//! The master secret is deliberately not part of these types; it is turned
//! into a [`MasterKey`](crate::cipher::MasterKey) once at startup.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default path of the subscriber file
pub const DEFAULT_STORE_PATH: &str = "users.json";

/// Main check-in configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckInConfig {
    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Notifier configuration
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Scheduler settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl CheckInConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.notifier.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based store
    File {
        /// Path to the subscriber file
        path: String,
    },

    /// In-memory store (not persistent)
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.trim().is_empty() => {
                Err(crate::Error::config("Store file path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: DEFAULT_STORE_PATH.to_string(),
        }
    }
}

/// Notifier configuration
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifierConfig {
    /// SMTP e-mail delivery
    Smtp {
        /// SMTP relay host
        host: String,
        /// SMTP relay port
        port: u16,
        /// Implicit TLS when true, STARTTLS otherwise
        #[serde(default)]
        secure: bool,
        /// Sender address, also the SMTP username
        sender_email: String,
        /// SMTP password
        /// ⚠️ NEVER log this value
        sender_password: String,
        /// Display name on the From header
        #[serde(default)]
        sender_name: Option<String>,
    },

    /// Log-only delivery (nothing leaves the process)
    #[default]
    Log,
}

impl NotifierConfig {
    /// Validate the notifier configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            NotifierConfig::Smtp {
                host,
                port,
                sender_email,
                sender_password,
                ..
            } => {
                if host.trim().is_empty() {
                    return Err(crate::Error::config("SMTP host cannot be empty"));
                }
                if *port == 0 {
                    return Err(crate::Error::config("SMTP port must be > 0"));
                }
                if !sender_email.contains('@') {
                    return Err(crate::Error::config(
                        "SMTP sender email must be an e-mail address",
                    ));
                }
                if sender_password.is_empty() {
                    return Err(crate::Error::config("SMTP sender password cannot be empty"));
                }
                Ok(())
            }
            NotifierConfig::Log => Ok(()),
        }
    }

    /// Get the notifier type name
    pub fn type_name(&self) -> &str {
        match self {
            NotifierConfig::Smtp { .. } => "smtp",
            NotifierConfig::Log => "log",
        }
    }
}

// Custom Debug implementation that hides the SMTP password
impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifierConfig::Smtp {
                host,
                port,
                secure,
                sender_email,
                sender_name,
                ..
            } => f
                .debug_struct("Smtp")
                .field("host", host)
                .field("port", port)
                .field("secure", secure)
                .field("sender_email", sender_email)
                .field("sender_password", &"<REDACTED>")
                .field("sender_name", sender_name)
                .finish(),
            NotifierConfig::Log => f.write_str("Log"),
        }
    }
}

/// What a sweep does with a record whose delivery failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Advance the due time anyway; the next attempt is one interval later
    #[default]
    Advance,
    /// Keep the due time; the record is retried on the next sweep
    Defer,
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Hour of day (UTC, 0-23) at which the daily sweep runs
    #[serde(default = "default_sweep_hour")]
    pub sweep_hour: u32,

    /// Run one catch-up sweep immediately when the scheduler starts
    ///
    /// Records that fell due while the process was down are delivered right
    /// away instead of waiting for the next sweep hour.
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,

    /// Upper bound on a single notifier call (in seconds)
    ///
    /// An elapsed timeout counts as a delivery failure.
    #[serde(default = "default_delivery_timeout_secs")]
    pub delivery_timeout_secs: u64,

    /// Handling of failed deliveries
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Capacity of the scheduler event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl SchedulerConfig {
    /// Validate the scheduler configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.sweep_hour > 23 {
            return Err(crate::Error::config(format!(
                "Sweep hour must be between 0 and 23, got {}",
                self.sweep_hour
            )));
        }
        if self.delivery_timeout_secs == 0 {
            return Err(crate::Error::config("Delivery timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_hour: default_sweep_hour(),
            run_on_startup: default_run_on_startup(),
            delivery_timeout_secs: default_delivery_timeout_secs(),
            failure_policy: FailurePolicy::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_sweep_hour() -> u32 {
    10
}

fn default_run_on_startup() -> bool {
    true
}

fn default_delivery_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    1000
}
