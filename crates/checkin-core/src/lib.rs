// # checkin-core
//
// Core library for the periodic "are you okay" check-in system.
//
// ## Architecture Overview
//
// - **Cipher**: AES-256-GCM encryption of contact addresses at rest
// - **RecordStore**: Trait for the durable subscriber mapping (file, memory)
// - **SubscriberStore**: Single-writer transactions over a RecordStore
// - **Scheduler**: Daily sweep that delivers due check-ins and advances due times
// - **Notifier**: Trait for the outbound transport (implemented elsewhere)
// - **CheckInService**: register / update / health for the request layer
//
// ## Design Principles
//
// 1. **Injected capabilities**: store, notifier and clock are passed in, never global
// 2. **Snapshot then commit**: every mutation loads the full mapping under one
//    lock and commits it with one atomic save
// 3. **No drift**: a fired record is next due at delivery instant + interval
// 4. **No plaintext at rest**: contacts are decrypted only for a single delivery

pub mod cipher;
pub mod config;
pub mod engine;
pub mod error;
pub mod message;
pub mod service;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use cipher::{Cipher, MasterKey};
pub use config::{CheckInConfig, FailurePolicy, NotifierConfig, SchedulerConfig, StoreConfig};
pub use engine::{Scheduler, SchedulerEvent, SweepReport};
pub use error::{Error, ErrorKind, Result};
pub use message::CheckInMessage;
pub use service::CheckInService;
pub use store::{FileRecordStore, MemoryRecordStore, SubscriberStore};
pub use traits::{
    Clock, Contact, LogNotifier, NewSubscriber, Notifier, RecordStore, SubscriberId,
    SubscriberMap, SubscriberRecord, SubscriberUpdate, SystemClock,
};
