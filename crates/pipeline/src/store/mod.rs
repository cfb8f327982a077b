//! Persisted-store collaborators.

mod memory;
mod postgres;

pub use memory::{MemoryStore, StaticSourceFeed};
pub use postgres::{connect_postgres, PgEntryStore, PgSourceFeed};

use async_trait::async_trait;
use collectify_core::{Entry, EntryPatch, Item, SourceDescriptor};

use crate::error::StoreError;

/// Hands out the descriptors the poller should visit.
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// All descriptors with `active = true`.
    async fn find_active(&self) -> Result<Vec<SourceDescriptor>, StoreError>;
}

/// Guid-keyed entry storage with a rolling expiry.
///
/// Expired entries are invisible to every operation: they count as
/// absent, cannot be updated or found, and a create replaces them.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Number of live entries with this guid (0 or 1).
    async fn count(&self, guid: &str) -> Result<u64, StoreError>;

    /// Insert a new entry. Fails with [`StoreError::Duplicate`] when a live
    /// entry with the same guid exists.
    async fn create(&self, item: &Item) -> Result<Entry, StoreError>;

    /// Apply the patch to the live entry with `patch.guid`; returns the
    /// number of entries matched.
    async fn update(&self, patch: &EntryPatch) -> Result<u64, StoreError>;

    async fn find_one(&self, guid: &str) -> Result<Option<Entry>, StoreError>;
}
