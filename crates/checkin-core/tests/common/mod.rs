//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles that record how the core
//! drives its capabilities without implementing real transports.

#![allow(dead_code)]

use checkin_core::config::{FailurePolicy, SchedulerConfig};
use checkin_core::error::{Error, Result};
use checkin_core::store::{MemoryRecordStore, SubscriberStore};
use checkin_core::traits::{Clock, Contact, Notifier, RecordStore, SubscriberMap};
use checkin_core::{Cipher, MasterKey};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const TEST_SECRET: &str = "contract-test-master-secret";

/// Fixed starting instant for every test clock
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 9, 10, 0, 0).unwrap()
}

/// A clock that only moves when told to
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// One recorded notifier call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub contact: String,
    pub display_name: Option<String>,
}

/// A mock Notifier that records calls and fails on demand
#[derive(Clone)]
pub struct MockNotifier {
    deliveries: Arc<Mutex<Vec<Delivery>>>,
    call_count: Arc<AtomicUsize>,
    failing_contacts: Arc<Mutex<HashSet<String>>>,
    delay: Option<std::time::Duration>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            deliveries: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            failing_contacts: Arc::new(Mutex::new(HashSet::new())),
            delay: None,
        }
    }

    /// Every call sleeps this long before answering
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Deliveries to this contact return an error
    pub fn fail_for(&self, contact: &str) {
        self.failing_contacts
            .lock()
            .unwrap()
            .insert(contact.to_string());
    }

    /// Stop failing deliveries to this contact
    pub fn recover(&self, contact: &str) {
        self.failing_contacts.lock().unwrap().remove(contact);
    }

    /// Number of times deliver() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Deliveries that returned Ok
    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for MockNotifier {
    async fn deliver(&self, contact: &Contact, display_name: Option<&str>) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing_contacts.lock().unwrap().contains(contact.as_str()) {
            return Err(Error::delivery("mock", "mailbox unavailable"));
        }

        self.deliveries.lock().unwrap().push(Delivery {
            contact: contact.as_str().to_string(),
            display_name: display_name.map(str::to_string),
        });
        Ok(())
    }

    fn notifier_name(&self) -> &'static str {
        "mock"
    }
}

/// A RecordStore that counts calls and can be told to fail commits
#[derive(Clone)]
pub struct CountingRecordStore {
    inner: MemoryRecordStore,
    load_count: Arc<AtomicUsize>,
    save_count: Arc<AtomicUsize>,
    fail_saves: Arc<AtomicBool>,
}

impl CountingRecordStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryRecordStore::new(),
            load_count: Arc::new(AtomicUsize::new(0)),
            save_count: Arc::new(AtomicUsize::new(0)),
            fail_saves: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn load_count(&self) -> usize {
        self.load_count.load(Ordering::SeqCst)
    }

    pub fn save_count(&self) -> usize {
        self.save_count.load(Ordering::SeqCst)
    }

    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Committed mapping, bypassing the counters
    pub async fn committed(&self) -> SubscriberMap {
        self.inner.load().await.unwrap()
    }
}

#[async_trait::async_trait]
impl RecordStore for CountingRecordStore {
    async fn load(&self) -> Result<SubscriberMap> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        self.inner.load().await
    }

    async fn save(&self, subscribers: &SubscriberMap) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::store_io("disk full"));
        }
        self.save_count.fetch_add(1, Ordering::SeqCst);
        self.inner.save(subscribers).await
    }

    fn store_name(&self) -> &'static str {
        "counting"
    }
}

pub fn test_cipher() -> Cipher {
    Cipher::new(&MasterKey::derive(TEST_SECRET).unwrap())
}

/// Store over a counting backend with a manual clock at [`t0`]
pub fn counting_store() -> (Arc<SubscriberStore>, CountingRecordStore, ManualClock) {
    let backend = CountingRecordStore::new();
    let clock = ManualClock::new(t0());
    let store = Arc::new(SubscriberStore::new(
        Box::new(backend.clone()),
        test_cipher(),
        Arc::new(clock.clone()),
    ));
    (store, backend, clock)
}

/// Scheduler settings for tests: no startup sweep, short timeout
pub fn test_scheduler_config() -> SchedulerConfig {
    SchedulerConfig {
        sweep_hour: 10,
        run_on_startup: false,
        delivery_timeout_secs: 1,
        failure_policy: FailurePolicy::Advance,
        event_channel_capacity: 100,
    }
}
