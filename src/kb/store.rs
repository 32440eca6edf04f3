//! Store capability interface.
//!
//! Backends differ in which write calls they offer: some only insert, some
//! upsert, some are async, some are not. Each capability is its own trait and
//! a backend advertises the ones it has through the `as_*` accessors on
//! [`KnowledgeStore`]. The adapter probes them at call time.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::kb::record::StoreRecord;

pub trait SyncInsert: Send + Sync {
    fn insert(&self, records: &[StoreRecord]) -> Result<()>;
}

#[async_trait]
pub trait AsyncInsert: Send + Sync {
    async fn insert(&self, records: &[StoreRecord]) -> Result<()>;
}

pub trait SyncUpsert: Send + Sync {
    fn upsert(&self, records: &[StoreRecord]) -> Result<()>;
}

#[async_trait]
pub trait AsyncUpsert: Send + Sync {
    async fn upsert(&self, records: &[StoreRecord]) -> Result<()>;
}

/// The generic "add documents" call of stores with no insert/upsert split.
pub trait SyncAdd: Send + Sync {
    fn add(&self, records: &[StoreRecord]) -> Result<()>;
}

pub trait SyncRemove: Send + Sync {
    /// Returns how many of `ids` existed.
    fn remove(&self, ids: &[String]) -> Result<usize>;
}

#[async_trait]
pub trait AsyncRemove: Send + Sync {
    async fn remove(&self, ids: &[String]) -> Result<usize>;
}

/// Read-back access. Required by the synchronizer.
#[async_trait]
pub trait RecordReader: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<StoreRecord>>;

    /// Whether records carry a persisted content hash.
    async fn has_hash_column(&self) -> Result<bool>;

    async fn ensure_hash_column(&self) -> Result<()>;

    /// Record id → stored hash for every record of `source`.
    async fn stored_hashes(&self, source: &str) -> Result<HashMap<String, Option<String>>>;
}

/// Companion store holding full document content next to the vectors.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Delete the records of a logical document whose ids are not in `keep`.
    /// Returns the count removed.
    async fn remove_by_doc_id(&self, doc_id: &str, keep: &[String]) -> Result<usize>;
}

/// A vector-searchable store. Every accessor defaults to `None`.
pub trait KnowledgeStore: Send + Sync {
    fn name(&self) -> &str;

    fn as_async_upsert(&self) -> Option<&dyn AsyncUpsert> {
        None
    }

    fn as_sync_upsert(&self) -> Option<&dyn SyncUpsert> {
        None
    }

    fn as_async_insert(&self) -> Option<&dyn AsyncInsert> {
        None
    }

    fn as_sync_insert(&self) -> Option<&dyn SyncInsert> {
        None
    }

    fn as_add(&self) -> Option<&dyn SyncAdd> {
        None
    }

    fn as_async_remove(&self) -> Option<&dyn AsyncRemove> {
        None
    }

    fn as_sync_remove(&self) -> Option<&dyn SyncRemove> {
        None
    }

    fn as_reader(&self) -> Option<&dyn RecordReader> {
        None
    }
}
