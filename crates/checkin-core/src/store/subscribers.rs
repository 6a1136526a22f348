//! Transactional subscriber store
//!
//! [`SubscriberStore`] wraps a [`RecordStore`] backend with a single commit
//! lock. Every read-modify-write (registration, update, scheduler sweep) runs
//! as one [`Transaction`]: take the lock, snapshot the full mapping, mutate
//! the copy, commit it with one `save`. Dropping a transaction without
//! committing writes nothing.
//!
//! Contact addresses are encrypted before they enter a transaction and are
//! never stored or logged in plaintext.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::cipher::Cipher;
use crate::error::{Error, Result};
use crate::traits::record_store::{
    NewSubscriber, RecordStore, SubscriberId, SubscriberMap, SubscriberRecord, SubscriberUpdate,
    due_after, normalize_interval_days,
};
use crate::traits::Clock;

/// Single-writer store of subscriber records
pub struct SubscriberStore {
    backend: Box<dyn RecordStore>,
    cipher: Cipher,
    clock: Arc<dyn Clock>,
    commit_lock: Mutex<()>,
}

/// An open snapshot of the mapping, holding the commit lock
///
/// No other transaction can start until this one is committed or dropped.
pub struct Transaction<'a> {
    _guard: MutexGuard<'a, ()>,
    backend: &'a dyn RecordStore,
    subscribers: SubscriberMap,
}

impl Transaction<'_> {
    /// The snapshot as loaded (plus any changes made so far)
    pub fn subscribers(&self) -> &SubscriberMap {
        &self.subscribers
    }

    /// Mutable access to the snapshot
    pub fn subscribers_mut(&mut self) -> &mut SubscriberMap {
        &mut self.subscribers
    }

    /// Persist the snapshot as the new committed mapping
    pub async fn commit(self) -> Result<()> {
        self.backend.save(&self.subscribers).await
    }
}

impl SubscriberStore {
    /// Create a store over the given backend
    pub fn new(backend: Box<dyn RecordStore>, cipher: Cipher, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            cipher,
            clock,
            commit_lock: Mutex::new(()),
        }
    }

    /// Cipher used for contact addresses
    pub fn cipher(&self) -> &Cipher {
        &self.cipher
    }

    /// Clock used for due-time arithmetic
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Name of the underlying backend
    pub fn backend_name(&self) -> &'static str {
        self.backend.store_name()
    }

    /// Take the commit lock and snapshot the full mapping
    pub async fn begin(&self) -> Result<Transaction<'_>> {
        let guard = self.commit_lock.lock().await;
        let subscribers = self.backend.load().await?;
        Ok(Transaction {
            _guard: guard,
            backend: self.backend.as_ref(),
            subscribers,
        })
    }

    /// Consistent snapshot of every record
    pub async fn load(&self) -> Result<SubscriberMap> {
        Ok(self.begin().await?.subscribers)
    }

    /// Look up one record
    pub async fn get(&self, id: &SubscriberId) -> Result<Option<SubscriberRecord>> {
        Ok(self.load().await?.remove(id))
    }

    /// Register a new subscriber
    ///
    /// The first check-in falls due `interval_days` after registration. The
    /// record is committed before this returns.
    pub async fn create(&self, new: NewSubscriber) -> Result<SubscriberId> {
        let contact = validate_contact(&new.contact)?;
        let interval_days = normalize_interval_days(new.interval_days)?;
        let display_name = new
            .display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());

        let contact_ciphertext = self.cipher.encrypt(contact)?;

        let mut tx = self.begin().await?;

        // Read the clock only once the lock is held
        let now = self.clock.now();
        let record = SubscriberRecord {
            contact_ciphertext,
            display_name,
            interval_days,
            next_due_at: due_after(now, interval_days)?,
            created_at: now,
            last_delivered_at: None,
        };
        let id = loop {
            let candidate = SubscriberId::generate();
            if !tx.subscribers().contains_key(&candidate) {
                break candidate;
            }
        };
        let next_due_at = record.next_due_at;
        tx.subscribers_mut().insert(id, record);
        tx.commit().await?;

        info!(
            "Registered subscriber {} (every {} day(s), first check-in {})",
            id, interval_days, next_due_at
        );
        Ok(id)
    }

    /// Change an existing subscriber's contact and/or cadence
    ///
    /// A new contact is re-encrypted; a blank contact counts as not
    /// supplied. A cadence is applied only when positive; the current due
    /// time is kept either way. Unknown ids fail with [`Error::NotFound`]
    /// and commit nothing.
    pub async fn update(&self, id: &SubscriberId, update: SubscriberUpdate) -> Result<()> {
        let contact = update
            .contact
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let contact_ciphertext = match contact {
            Some(contact) => Some(self.cipher.encrypt(contact)?),
            None => None,
        };
        let interval_days = match update.interval_days {
            Some(days) if days > 0 => Some(normalize_interval_days(Some(days))?),
            _ => None,
        };

        let mut tx = self.begin().await?;
        let record = tx
            .subscribers_mut()
            .get_mut(id)
            .ok_or_else(|| Error::not_found(id.to_string()))?;

        if let Some(ciphertext) = contact_ciphertext {
            record.contact_ciphertext = ciphertext;
        }
        if let Some(days) = interval_days {
            record.interval_days = days;
        }

        tx.commit().await?;

        debug!(
            "Updated subscriber {} (contact changed: {}, interval: {:?})",
            id,
            contact.is_some(),
            interval_days
        );
        Ok(())
    }
}

impl std::fmt::Debug for SubscriberStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberStore")
            .field("backend", &self.backend.store_name())
            .finish()
    }
}

fn validate_contact(contact: &str) -> Result<&str> {
    let contact = contact.trim();
    if contact.is_empty() {
        return Err(Error::invalid_input("contact cannot be empty"));
    }
    Ok(contact)
}
