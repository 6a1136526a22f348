//! Core traits for the check-in system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`RecordStore`]: Durable medium for the subscriber mapping
//! - [`Notifier`]: Deliver a check-in message to a contact address
//! - [`Clock`]: Source of the current time for scheduling decisions

pub mod clock;
pub mod notifier;
pub mod record_store;

pub use clock::{Clock, SystemClock};
pub use notifier::{Contact, LogNotifier, Notifier};
pub use record_store::{
    NewSubscriber, RecordStore, SubscriberId, SubscriberMap, SubscriberRecord, SubscriberUpdate,
};
