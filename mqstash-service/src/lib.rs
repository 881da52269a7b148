//! Persistence services for broker session state.
//!
//! [`MessageService`] keeps messages queued for a connection, keyed by message
//! id. [`PushPropertyCache`] remembers the properties last pushed to a
//! connection so later deliveries can reuse them. Both delegate to the storage
//! traits of `mqstash-storage` and hold no state of their own besides the
//! optional upsert locks.

mod keyed_lock;

pub mod error;
pub mod mapping;
pub mod message_service;
pub mod push_props;

pub use error::{Result, ServiceError};
pub use message_service::MessageService;
pub use push_props::PushPropertyCache;

/// Tuning knobs for [`MessageService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceOptions {
    /// Serialize `push_to_connection` calls that share a message id within
    /// this process. The store's find and save are separate round trips, so
    /// without this two concurrent pushes of one id may overwrite each
    /// other's merge.
    pub serialize_upserts: bool,
}
