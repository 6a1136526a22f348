// # Record Store Implementations
//
// This module provides implementations of the RecordStore trait for
// different persistence strategies, plus the transactional wrapper that
// every mutation goes through.

pub mod file;
pub mod memory;
pub mod subscribers;

pub use file::FileRecordStore;
pub use memory::MemoryRecordStore;
pub use subscribers::{SubscriberStore, Transaction};
