//! Registration facade
//!
//! [`CheckInService`] is the surface an HTTP (or any other request) layer
//! calls: `register`, `update` and `health`. It never touches the
//! scheduler; both only meet at the [`SubscriberStore`].
//!
//! ```rust
//! use std::sync::Arc;
//! use checkin_core::{CheckInService, Cipher, MasterKey, SubscriberStore, SystemClock};
//! use checkin_core::store::MemoryRecordStore;
//!
//! # #[tokio::main]
//! # async fn main() -> checkin_core::Result<()> {
//! let cipher = Cipher::new(&MasterKey::derive("secret")?);
//! let store = Arc::new(SubscriberStore::new(
//!     Box::new(MemoryRecordStore::new()),
//!     cipher,
//!     Arc::new(SystemClock),
//! ));
//! let service = CheckInService::new(store);
//!
//! let id = service.register("a@x.com", Some("Ada"), Some(2)).await?;
//! service.update(&id.to_string(), None, Some(7)).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::error::Result;
use crate::store::SubscriberStore;
use crate::traits::{NewSubscriber, SubscriberId, SubscriberUpdate};

/// Liveness string returned by [`CheckInService::health`]
pub const HEALTH_MESSAGE: &str = "In Case I Die - Check-in API is live";

/// Request-facing operations on the subscriber store
#[derive(Debug, Clone)]
pub struct CheckInService {
    store: Arc<SubscriberStore>,
}

impl CheckInService {
    /// Create the service over a shared store
    pub fn new(store: Arc<SubscriberStore>) -> Self {
        Self { store }
    }

    /// Register a subscriber and return its new id
    ///
    /// `interval_days` defaults to 1 when absent or non-positive.
    pub async fn register(
        &self,
        contact: &str,
        display_name: Option<&str>,
        interval_days: Option<i64>,
    ) -> Result<SubscriberId> {
        self.store
            .create(NewSubscriber {
                contact: contact.to_string(),
                display_name: display_name.map(str::to_string),
                interval_days,
            })
            .await
    }

    /// Update a subscriber's contact and/or cadence
    ///
    /// An id that does not parse cannot exist and fails like an unknown id,
    /// with [`Error::NotFound`](crate::Error::NotFound).
    pub async fn update(
        &self,
        id: &str,
        contact: Option<&str>,
        interval_days: Option<i64>,
    ) -> Result<()> {
        let id: SubscriberId = id.trim().parse()?;
        self.store
            .update(
                &id,
                SubscriberUpdate {
                    contact: contact.map(str::to_string),
                    interval_days,
                },
            )
            .await
    }

    /// Liveness check
    pub fn health(&self) -> &'static str {
        HEALTH_MESSAGE
    }
}
