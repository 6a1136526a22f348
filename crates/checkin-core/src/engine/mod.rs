//! Check-in scheduler
//!
//! The Scheduler is responsible for:
//! - Waking once a day at the configured sweep hour
//! - Finding every subscriber whose due time has passed
//! - Decrypting the contact and handing it to the Notifier
//! - Advancing each fired record's due time before it is delivered
//!
//! ## Architecture
//!
//! ```text
//!   daily timer ──► Scheduler::sweep_once()
//!                        │
//!        ┌───────────────┼────────────────┬───────────────┐
//!        ▼               ▼                ▼               ▼
//! ┌──────────────┐ ┌──────────┐   ┌──────────────┐ ┌─────────────┐
//! │SubscriberStore│ │  Cipher  │   │   Notifier   │ │   Events    │
//! │ (begin/commit)│ │(decrypt) │   │  (deliver)   │ │  (observe)  │
//! └──────────────┘ └──────────┘   └──────────────┘ └─────────────┘
//! ```
//!
//! ## Sweep Flow
//!
//! 1. Claim: under the commit lock, decrypt every record with
//!    `next_due_at <= now`, set `next_due_at = now + interval`, commit once,
//!    release the lock
//! 2. Deliver each claimed record outside the lock, bounded by the delivery
//!    timeout
//! 3. Under [`FailurePolicy::Defer`] only: a second short transaction puts
//!    failed records back to their old due time, unless they were edited
//!    in the meantime
//!
//! Per-record failures (bad token, transport error, timeout) never abort the
//! sweep. A failed load or claim commit aborts it before anything is sent and
//! leaves the previously committed mapping in place; the next sweep tries
//! again.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, trace, warn};

use crate::config::{FailurePolicy, SchedulerConfig};
use crate::error::{Error, Result};
use crate::store::SubscriberStore;
use crate::traits::{Contact, Notifier, SubscriberId, SubscriberRecord};

/// Events emitted by the Scheduler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Scheduler started
    Started {
        next_sweep_at: DateTime<Utc>,
    },

    /// Sweep started
    SweepStarted {
        at: DateTime<Utc>,
        subscribers: usize,
    },

    /// Check-in delivered
    DeliverySucceeded {
        subscriber: SubscriberId,
    },

    /// Notifier failed or timed out
    DeliveryFailed {
        subscriber: SubscriberId,
        error: String,
        advanced: bool,
    },

    /// Stored contact could not be decrypted; nothing was sent
    DecryptFailed {
        subscriber: SubscriberId,
        error: String,
        advanced: bool,
    },

    /// Sweep finished
    SweepCompleted(SweepReport),

    /// Sweep could not load or claim; nothing was persisted or sent
    SweepAborted {
        error: String,
    },

    /// Scheduler stopped
    Stopped {
        reason: String,
    },
}

/// Outcome counts of one sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Sweep instant; every advanced record is due again `interval` after this
    pub started_at: DateTime<Utc>,
    /// Records in the snapshot
    pub subscribers: usize,
    /// Records that were due
    pub due: usize,
    /// Deliveries accepted by the notifier
    pub delivered: usize,
    /// Due records not delivered (delivery errors plus decrypt errors)
    pub failed: usize,
    /// Subset of `failed` caused by an unreadable contact token
    pub decrypt_failed: usize,
    /// Failed records left due under [`FailurePolicy::Defer`]
    pub deferred: usize,
}

impl SweepReport {
    fn new(started_at: DateTime<Utc>, subscribers: usize) -> Self {
        Self {
            started_at,
            subscribers,
            due: 0,
            delivered: 0,
            failed: 0,
            decrypt_failed: 0,
            deferred: 0,
        }
    }
}

/// A due record advanced by the claim commit and awaiting delivery
struct Claim {
    id: SubscriberId,
    contact: Contact,
    display_name: Option<String>,
    /// Record as committed by the claim
    claimed: SubscriberRecord,
    /// Record before the claim
    previous: SubscriberRecord,
}

/// Core check-in scheduler
///
/// ## Lifecycle
///
/// 1. Create with [`Scheduler::new()`]
/// 2. Start with [`Scheduler::run()`] (or call [`Scheduler::sweep_once()`] directly)
/// 3. Scheduler sleeps until each sweep hour, sweeps, and repeats
/// 4. Stops on shutdown signal; an in-flight sweep always finishes first
///
/// ## Idle Behavior
///
/// Between sweeps the scheduler is parked on a single timer. It does no
/// polling and touches neither the store nor the notifier.
pub struct Scheduler {
    /// Transactional subscriber store
    store: Arc<SubscriberStore>,

    /// Delivery capability
    notifier: Box<dyn Notifier>,

    /// Sweep hour, timeout, failure policy
    config: SchedulerConfig,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<SchedulerEvent>,
}

impl Scheduler {
    /// Create a new scheduler
    ///
    /// # Returns
    ///
    /// A tuple of (scheduler, event_receiver) where event_receiver yields scheduler events
    pub fn new(
        store: Arc<SubscriberStore>,
        notifier: Box<dyn Notifier>,
        config: SchedulerConfig,
    ) -> Result<(Self, mpsc::Receiver<SchedulerEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let scheduler = Self {
            store,
            notifier,
            config,
            event_tx: tx,
        };

        Ok((scheduler, rx))
    }

    /// Run the scheduler until Ctrl-C
    pub async fn run(&self) -> Result<()> {
        self.run_internal(None).await
    }

    /// Run the scheduler until the given shutdown signal fires
    ///
    /// The daemon feeds this from its SIGTERM/SIGINT handler; tests use it
    /// for controlled shutdown. Dropping the sender also stops the scheduler.
    pub async fn run_with_shutdown(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        self.run_internal(shutdown_rx).await
    }

    async fn run_internal(
        &self,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()> {
        let mut after = self.store.clock().now();

        self.emit_event(SchedulerEvent::Started {
            next_sweep_at: next_sweep_after(after, self.config.sweep_hour),
        });
        info!(
            "Scheduler started: daily sweep at {:02}:00 UTC via '{}' notifier",
            self.config.sweep_hour,
            self.notifier.notifier_name()
        );

        if self.config.run_on_startup {
            info!("Running startup catch-up sweep");
            if let Err(e) = self.sweep_once().await {
                error!("Startup sweep failed: {}", e);
            }
        }

        let shutdown = async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
        };
        tokio::pin!(shutdown);

        loop {
            let next = next_sweep_after(after, self.config.sweep_hour);
            let wait = (next - self.store.clock().now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            debug!("Next sweep at {} (in {:?})", next, wait);

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Sweep failed: {}", e);
                        // Continue running; the next sweep retries
                    }
                    after = self.store.clock().now().max(next);
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    self.emit_event(SchedulerEvent::Stopped {
                        reason: "Shutdown signal".to_string(),
                    });
                    break;
                }
            }
        }

        info!("Scheduler stopped");
        Ok(())
    }

    /// Run one sweep over every subscriber
    ///
    /// The commit lock is held only while due records are claimed and while
    /// deferred failures are put back; deliveries run without it, so
    /// registrations and updates never wait on a slow notifier.
    ///
    /// # Returns
    ///
    /// - `Ok(SweepReport)`: The claim was committed
    /// - `Err(Error)`: The store could not be loaded or committed; nothing changed
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let (claims, mut report) = self.claim_due().await?;

        let mut failures = Vec::new();
        for claim in &claims {
            match self.deliver(&claim.contact, claim.display_name.as_deref()).await {
                Ok(()) => {
                    report.delivered += 1;
                    self.emit_event(SchedulerEvent::DeliverySucceeded {
                        subscriber: claim.id,
                    });
                }
                Err(e) => {
                    report.failed += 1;
                    warn!("Check-in delivery failed for {}: {}", claim.id, e);
                    failures.push((claim, e.to_string()));
                }
            }
        }

        let restored = match self.config.failure_policy {
            FailurePolicy::Advance => Vec::new(),
            FailurePolicy::Defer => self.restore_failed(&failures).await,
        };
        report.deferred += restored.len();

        for (claim, error) in failures {
            self.emit_event(SchedulerEvent::DeliveryFailed {
                subscriber: claim.id,
                error,
                advanced: !restored.contains(&claim.id),
            });
        }

        info!(
            "Sweep complete: {} due, {} delivered, {} failed, {} deferred",
            report.due, report.delivered, report.failed, report.deferred
        );
        self.emit_event(SchedulerEvent::SweepCompleted(report.clone()));
        Ok(report)
    }

    /// Advance every due record under the commit lock and commit once
    ///
    /// Undecryptable records are settled here according to the failure
    /// policy. Nothing is delivered if the commit fails.
    async fn claim_due(&self) -> Result<(Vec<Claim>, SweepReport)> {
        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                self.emit_event(SchedulerEvent::SweepAborted {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let now = self.store.clock().now();
        let mut report = SweepReport::new(now, tx.subscribers().len());
        self.emit_event(SchedulerEvent::SweepStarted {
            at: now,
            subscribers: report.subscribers,
        });

        let due: Vec<SubscriberId> = tx
            .subscribers()
            .iter()
            .filter(|(_, record)| record.is_due(now))
            .map(|(id, _)| *id)
            .collect();
        report.due = due.len();
        debug!("Sweep at {}: {} of {} due", now, report.due, report.subscribers);

        let advance_failed = self.config.failure_policy == FailurePolicy::Advance;
        let mut claims = Vec::with_capacity(due.len());

        for id in due {
            let Some(record) = tx.subscribers_mut().get_mut(&id) else {
                continue;
            };
            let previous = record.clone();

            let contact = match self.store.cipher().decrypt(&record.contact_ciphertext) {
                Ok(plaintext) => Some(Contact::from(plaintext)),
                Err(e) => {
                    report.failed += 1;
                    report.decrypt_failed += 1;
                    error!("Cannot decrypt contact for {}, skipping delivery: {}", id, e);
                    self.emit_event(SchedulerEvent::DecryptFailed {
                        subscriber: id,
                        error: e.to_string(),
                        advanced: advance_failed,
                    });
                    None
                }
            };

            if contact.is_none() && !advance_failed {
                report.deferred += 1;
                debug!("Subscriber {} stays due (deferred)", id);
                continue;
            }

            if let Err(e) = record.advance(now) {
                if contact.is_some() {
                    report.failed += 1;
                }
                error!("Cannot advance due time for {}: {}", id, e);
                continue;
            }
            trace!("Subscriber {} next due at {}", id, record.next_due_at);

            if let Some(contact) = contact {
                claims.push(Claim {
                    id,
                    contact,
                    display_name: record.display_name.clone(),
                    claimed: record.clone(),
                    previous,
                });
            }
        }

        if let Err(e) = tx.commit().await {
            error!("Failed to commit sweep: {}", e);
            self.emit_event(SchedulerEvent::SweepAborted {
                error: e.to_string(),
            });
            return Err(e);
        }

        Ok((claims, report))
    }

    /// Put failed deliveries back to their pre-sweep due time
    ///
    /// A record edited or removed since it was claimed is left alone. If the
    /// restore cannot be committed the records stay advanced.
    async fn restore_failed(&self, failures: &[(&Claim, String)]) -> Vec<SubscriberId> {
        if failures.is_empty() {
            return Vec::new();
        }

        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => {
                error!("Cannot reopen store to defer failed deliveries: {}", e);
                return Vec::new();
            }
        };

        let mut restored = Vec::new();
        for (claim, _) in failures {
            match tx.subscribers_mut().get_mut(&claim.id) {
                Some(record) if *record == claim.claimed => {
                    *record = claim.previous.clone();
                    restored.push(claim.id);
                    debug!("Subscriber {} stays due (deferred)", claim.id);
                }
                _ => debug!("Subscriber {} changed during delivery, not deferred", claim.id),
            }
        }

        if restored.is_empty() {
            return restored;
        }

        match tx.commit().await {
            Ok(()) => restored,
            Err(e) => {
                error!("Failed to commit deferred records, they stay advanced: {}", e);
                Vec::new()
            }
        }
    }

    /// Perform a single delivery, bounded by the delivery timeout
    async fn deliver(&self, contact: &Contact, display_name: Option<&str>) -> Result<()> {
        let timeout = std::time::Duration::from_secs(self.config.delivery_timeout_secs);
        let name = self.notifier.notifier_name();

        match tokio::time::timeout(timeout, self.notifier.deliver(contact, display_name)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e @ Error::Delivery { .. })) => Err(e),
            Ok(Err(e)) => Err(Error::delivery(name, e.to_string())),
            Err(_) => Err(Error::delivery(
                name,
                format!("timed out after {}s", self.config.delivery_timeout_secs),
            )),
        }
    }

    /// Emit a scheduler event
    fn emit_event(&self, event: SchedulerEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                trace!("Event receiver dropped, event discarded");
            }
        }
    }
}

/// First sweep instant strictly after `now`
///
/// Sweeps happen daily at `hour`:00:00 UTC.
pub fn next_sweep_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let today = Utc.from_utc_datetime(&now.date_naive().and_time(at));
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}
