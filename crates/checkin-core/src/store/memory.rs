// # Memory Record Store
//
// In-memory implementation of RecordStore.
//
// ## Purpose
//
// Provides a simple, fast record store that doesn't persist across restarts.
// Useful for testing and for throwaway deployments.
//
// ## Crash Behavior
//
// - All subscribers are lost on restart/crash
// - No recovery possible (state is in-memory only)

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::record_store::{RecordStore, SubscriberMap};

/// In-memory record store implementation
///
/// `save` replaces the whole mapping under a write lock, so readers see
/// either the old or the new mapping.
///
/// # Example
///
/// ```rust
/// use checkin_core::store::MemoryRecordStore;
/// use checkin_core::traits::RecordStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryRecordStore::new();
///     assert!(store.load().await?.is_empty());
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<RwLock<SubscriberMap>>,
}

impl MemoryRecordStore {
    /// Create a new empty memory record store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of subscribers in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self) -> Result<SubscriberMap> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, subscribers: &SubscriberMap) -> Result<()> {
        *self.inner.write().await = subscribers.clone();
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::record_store::{SubscriberId, SubscriberRecord};
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty().await);

        let now = Utc::now();
        let mut subscribers = SubscriberMap::new();
        subscribers.insert(
            SubscriberId::generate(),
            SubscriberRecord {
                contact_ciphertext: "aa:bb".to_string(),
                display_name: None,
                interval_days: 1,
                next_due_at: now,
                created_at: now,
                last_delivered_at: None,
            },
        );

        store.save(&subscribers).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.load().await.unwrap(), subscribers);

        // Snapshots are copies
        let mut snapshot = store.load().await.unwrap();
        snapshot.clear();
        assert_eq!(store.len().await, 1);
    }
}
