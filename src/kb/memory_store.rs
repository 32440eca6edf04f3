//! In-memory [`KnowledgeStore`] with a configurable capability set.
//!
//! Records live in a `BTreeMap` behind `std::sync::RwLock`. Every write call
//! is counted, which is what idempotence checks look at.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::error::{KbenrichError, Result};
use crate::kb::record::StoreRecord;
use crate::kb::store::{
    AsyncInsert, AsyncRemove, AsyncUpsert, ContentStore, KnowledgeStore, RecordReader, SyncAdd, SyncInsert,
    SyncRemove, SyncUpsert,
};

/// Which capability accessors the store answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub async_upsert: bool,
    pub sync_upsert: bool,
    pub async_insert: bool,
    pub sync_insert: bool,
    pub add: bool,
    pub async_remove: bool,
    pub sync_remove: bool,
    pub reader: bool,
}

impl Capabilities {
    pub fn none() -> Self {
        Self {
            async_upsert: false,
            sync_upsert: false,
            async_insert: false,
            sync_insert: false,
            add: false,
            async_remove: false,
            sync_remove: false,
            reader: false,
        }
    }

    /// Synchronous variants, the generic add and the reader.
    pub fn sync_only() -> Self {
        Self {
            sync_upsert: true,
            sync_insert: true,
            add: true,
            sync_remove: true,
            reader: true,
            ..Self::none()
        }
    }

    pub fn all() -> Self {
        Self {
            async_upsert: true,
            async_insert: true,
            async_remove: true,
            ..Self::sync_only()
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::sync_only()
    }
}

/// Per-call write counters.
#[derive(Debug, Default)]
pub struct WriteCounters {
    pub inserts: AtomicUsize,
    pub upserts: AtomicUsize,
    pub adds: AtomicUsize,
    pub removes: AtomicUsize,
}

/// Snapshot of [`WriteCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub inserts: usize,
    pub upserts: usize,
    pub adds: usize,
    pub removes: usize,
}

impl WriteCounts {
    pub fn total(&self) -> usize {
        self.inserts + self.upserts + self.adds + self.removes
    }
}

pub struct InMemoryStore {
    name: String,
    capabilities: Capabilities,
    records: RwLock<BTreeMap<String, StoreRecord>>,
    hash_column: AtomicBool,
    counters: WriteCounters,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::default())
    }

    pub fn with_capabilities(capabilities: Capabilities) -> Self {
        Self {
            name: "memory".to_string(),
            capabilities,
            records: RwLock::new(BTreeMap::new()),
            hash_column: AtomicBool::new(false),
            counters: WriteCounters::default(),
        }
    }

    /// Start with the hash column already present, as after a first load.
    pub fn with_hash_column(self) -> Self {
        self.hash_column.store(true, Ordering::SeqCst);
        self
    }

    pub fn write_counts(&self) -> WriteCounts {
        WriteCounts {
            inserts: self.counters.inserts.load(Ordering::SeqCst),
            upserts: self.counters.upserts.load(Ordering::SeqCst),
            adds: self.counters.adds.load(Ordering::SeqCst),
            removes: self.counters.removes.load(Ordering::SeqCst),
        }
    }

    pub fn reset_counts(&self) {
        for counter in [
            &self.counters.inserts,
            &self.counters.upserts,
            &self.counters.adds,
            &self.counters.removes,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
    }

    pub fn len(&self) -> usize {
        self.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored record, in id order.
    pub fn records(&self) -> Result<Vec<StoreRecord>> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoreRecord>>> {
        self.records
            .read()
            .map_err(|_| KbenrichError::Store("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoreRecord>>> {
        self.records
            .write()
            .map_err(|_| KbenrichError::Store("memory store lock poisoned".to_string()))
    }

    /// Without the hash column the store has nowhere to keep the hash.
    fn prepare(&self, record: &StoreRecord) -> StoreRecord {
        let mut record = record.clone();
        if !self.hash_column.load(Ordering::SeqCst) {
            record.content_hash = None;
        }
        record
    }

    fn insert_new(&self, records: &[StoreRecord]) -> Result<()> {
        let mut map = self.write()?;
        if let Some(existing) = records.iter().find(|r| map.contains_key(&r.id)) {
            return Err(KbenrichError::Store(format!("record {} already exists", existing.id)));
        }
        for record in records {
            map.insert(record.id.clone(), self.prepare(record));
        }
        Ok(())
    }

    fn upsert_all(&self, records: &[StoreRecord]) -> Result<()> {
        let mut map = self.write()?;
        for record in records {
            map.insert(record.id.clone(), self.prepare(record));
        }
        Ok(())
    }

    fn remove_ids(&self, ids: &[String]) -> Result<usize> {
        let mut map = self.write()?;
        Ok(ids.iter().filter(|id| map.remove(id.as_str()).is_some()).count())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeStore for InMemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn as_async_upsert(&self) -> Option<&dyn AsyncUpsert> {
        self.capabilities.async_upsert.then_some(self as &dyn AsyncUpsert)
    }

    fn as_sync_upsert(&self) -> Option<&dyn SyncUpsert> {
        self.capabilities.sync_upsert.then_some(self as &dyn SyncUpsert)
    }

    fn as_async_insert(&self) -> Option<&dyn AsyncInsert> {
        self.capabilities.async_insert.then_some(self as &dyn AsyncInsert)
    }

    fn as_sync_insert(&self) -> Option<&dyn SyncInsert> {
        self.capabilities.sync_insert.then_some(self as &dyn SyncInsert)
    }

    fn as_add(&self) -> Option<&dyn SyncAdd> {
        self.capabilities.add.then_some(self as &dyn SyncAdd)
    }

    fn as_async_remove(&self) -> Option<&dyn AsyncRemove> {
        self.capabilities.async_remove.then_some(self as &dyn AsyncRemove)
    }

    fn as_sync_remove(&self) -> Option<&dyn SyncRemove> {
        self.capabilities.sync_remove.then_some(self as &dyn SyncRemove)
    }

    fn as_reader(&self) -> Option<&dyn RecordReader> {
        self.capabilities.reader.then_some(self as &dyn RecordReader)
    }
}

impl SyncInsert for InMemoryStore {
    fn insert(&self, records: &[StoreRecord]) -> Result<()> {
        self.counters.inserts.fetch_add(1, Ordering::SeqCst);
        self.insert_new(records)
    }
}

#[async_trait]
impl AsyncInsert for InMemoryStore {
    async fn insert(&self, records: &[StoreRecord]) -> Result<()> {
        self.counters.inserts.fetch_add(1, Ordering::SeqCst);
        self.insert_new(records)
    }
}

impl SyncUpsert for InMemoryStore {
    fn upsert(&self, records: &[StoreRecord]) -> Result<()> {
        self.counters.upserts.fetch_add(1, Ordering::SeqCst);
        self.upsert_all(records)
    }
}

#[async_trait]
impl AsyncUpsert for InMemoryStore {
    async fn upsert(&self, records: &[StoreRecord]) -> Result<()> {
        self.counters.upserts.fetch_add(1, Ordering::SeqCst);
        self.upsert_all(records)
    }
}

impl SyncAdd for InMemoryStore {
    fn add(&self, records: &[StoreRecord]) -> Result<()> {
        self.counters.adds.fetch_add(1, Ordering::SeqCst);
        self.insert_new(records)
    }
}

impl SyncRemove for InMemoryStore {
    fn remove(&self, ids: &[String]) -> Result<usize> {
        self.counters.removes.fetch_add(1, Ordering::SeqCst);
        self.remove_ids(ids)
    }
}

#[async_trait]
impl AsyncRemove for InMemoryStore {
    async fn remove(&self, ids: &[String]) -> Result<usize> {
        self.counters.removes.fetch_add(1, Ordering::SeqCst);
        self.remove_ids(ids)
    }
}

#[async_trait]
impl RecordReader for InMemoryStore {
    async fn get(&self, id: &str) -> Result<Option<StoreRecord>> {
        Ok(self.read()?.get(id).cloned())
    }

    async fn has_hash_column(&self) -> Result<bool> {
        Ok(self.hash_column.load(Ordering::SeqCst))
    }

    async fn ensure_hash_column(&self) -> Result<()> {
        self.hash_column.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stored_hashes(&self, source: &str) -> Result<HashMap<String, Option<String>>> {
        Ok(self
            .read()?
            .values()
            .filter(|r| r.source.as_deref() == Some(source))
            .map(|r| (r.id.clone(), r.content_hash.clone()))
            .collect())
    }
}

#[async_trait]
impl ContentStore for InMemoryStore {
    async fn remove_by_doc_id(&self, doc_id: &str, keep: &[String]) -> Result<usize> {
        let mut map = self.write()?;
        let before = map.len();
        map.retain(|id, r| r.doc_id != doc_id || keep.contains(id));
        Ok(before - map.len())
    }
}
