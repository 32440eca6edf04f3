//! Knowledge-base adapter: turns processed documents into store records and
//! routes writes to whichever capability the store offers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{KbenrichError, Result};
use crate::kb::record::StoreRecord;
use crate::kb::signature::ContentSignature;
use crate::kb::store::{ContentStore, KnowledgeStore, RecordReader};
use crate::processing::types::{Chunk, ProcessedDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    Upsert,
}

/// The concrete store call chosen for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
    AsyncUpsert,
    SyncUpsert,
    AsyncInsert,
    SyncInsert,
    Add,
}

impl fmt::Display for WriteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WriteMethod::AsyncUpsert => "async upsert",
            WriteMethod::SyncUpsert => "upsert",
            WriteMethod::AsyncInsert => "async insert",
            WriteMethod::SyncInsert => "insert",
            WriteMethod::Add => "add",
        };
        f.write_str(name)
    }
}

/// Pick the write call for `mode`.
///
/// Upsert prefers async upsert, then sync upsert, then falls through to the
/// insert chain. Insert prefers async insert, then sync insert, then add.
pub fn resolve_write_method(store: &dyn KnowledgeStore, mode: WriteMode) -> Result<WriteMethod> {
    if mode == WriteMode::Upsert {
        if store.as_async_upsert().is_some() {
            return Ok(WriteMethod::AsyncUpsert);
        }
        if store.as_sync_upsert().is_some() {
            return Ok(WriteMethod::SyncUpsert);
        }
    }
    if store.as_async_insert().is_some() {
        return Ok(WriteMethod::AsyncInsert);
    }
    if store.as_sync_insert().is_some() {
        return Ok(WriteMethod::SyncInsert);
    }
    if store.as_add().is_some() {
        return Ok(WriteMethod::Add);
    }
    Err(KbenrichError::Store(format!(
        "store '{}' exposes no insert, upsert or add capability",
        store.name()
    )))
}

/// Store record id of one chunk.
pub fn chunk_record_id(document_id: &str, index: usize) -> String {
    format!("{}::{}", document_id, index)
}

/// One store record per chunk, with the filter fields flattened into metadata.
///
/// Caller metadata from the submitted document sits underneath: on a key clash
/// the enhanced fields win.
pub fn document_records(doc: &ProcessedDocument) -> Result<Vec<StoreRecord>> {
    doc.chunks
        .iter()
        .enumerate()
        .map(|(position, chunk)| chunk_record(doc, position, chunk))
        .collect()
}

fn chunk_record(doc: &ProcessedDocument, position: usize, chunk: &Chunk) -> Result<StoreRecord> {
    let index = chunk.info().map(|info| info.index).unwrap_or(position);

    let mut map = doc.input_metadata.clone();
    if let Value::Object(enhanced) = serde_json::to_value(&chunk.metadata)? {
        map.extend(enhanced);
    }
    map.insert("document_id".to_string(), Value::from(doc.document_id.as_str()));
    map.insert("document_name".to_string(), Value::from(doc.document_name.as_str()));
    map.insert(
        "processing_date".to_string(),
        Value::from(chunk.metadata.processing_date.to_rfc3339()),
    );
    if let Some(date) = chunk.metadata.document_date() {
        map.insert("document_date".to_string(), Value::from(date));
    }
    let metadata = Value::Object(map);

    let id = chunk_record_id(&doc.document_id, index);
    let hash = ContentSignature::compute(&id, &chunk.content, &Default::default());

    Ok(StoreRecord {
        id,
        doc_id: doc.document_id.clone(),
        source: None,
        content: chunk.content.clone(),
        metadata,
        content_hash: Some(hash.into_string()),
    })
}

/// Routes writes to a [`KnowledgeStore`], optionally keeping a content-store
/// companion in step.
#[derive(Clone)]
pub struct KnowledgeBaseAdapter {
    store: Arc<dyn KnowledgeStore>,
    content_store: Option<Arc<dyn ContentStore>>,
}

impl KnowledgeBaseAdapter {
    pub fn new(store: Arc<dyn KnowledgeStore>) -> Self {
        Self {
            store,
            content_store: None,
        }
    }

    pub fn with_content_store(mut self, content_store: Arc<dyn ContentStore>) -> Self {
        self.content_store = Some(content_store);
        self
    }

    pub fn store(&self) -> &dyn KnowledgeStore {
        self.store.as_ref()
    }

    pub fn reader(&self) -> Option<&dyn RecordReader> {
        self.store.as_reader()
    }

    pub fn resolve_write_method(&self, mode: WriteMode) -> Result<WriteMethod> {
        resolve_write_method(self.store.as_ref(), mode)
    }

    /// Write every chunk of a processed document. Returns the record count.
    pub async fn write(&self, doc: &ProcessedDocument, mode: WriteMode) -> Result<usize> {
        let records = document_records(doc)?;
        self.write_records(records, mode).await
    }

    pub async fn write_records(&self, records: Vec<StoreRecord>, mode: WriteMode) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let method = self.resolve_write_method(mode)?;

        log::debug!("Writing {} records via {}", records.len(), method);
        let store = self.store.as_ref();
        let unavailable = || KbenrichError::Store(format!("store '{}' lost capability {}", store.name(), method));
        match method {
            WriteMethod::AsyncUpsert => store.as_async_upsert().ok_or_else(unavailable)?.upsert(&records).await?,
            WriteMethod::SyncUpsert => store.as_sync_upsert().ok_or_else(unavailable)?.upsert(&records)?,
            WriteMethod::AsyncInsert => store.as_async_insert().ok_or_else(unavailable)?.insert(&records).await?,
            WriteMethod::SyncInsert => store.as_sync_insert().ok_or_else(unavailable)?.insert(&records)?,
            WriteMethod::Add => store.as_add().ok_or_else(unavailable)?.add(&records)?,
        }

        if mode == WriteMode::Upsert {
            self.clear_companion(&records).await;
        }
        Ok(records.len())
    }

    /// Remove records by id. Returns how many existed.
    pub async fn remove(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        if let Some(remover) = self.store.as_async_remove() {
            return remover.remove(ids).await;
        }
        if let Some(remover) = self.store.as_sync_remove() {
            return remover.remove(ids);
        }
        Err(KbenrichError::Store(format!(
            "store '{}' exposes no remove capability",
            self.store.name()
        )))
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoreRecord>> {
        match self.store.as_reader() {
            Some(reader) => reader.get(id).await,
            None => Err(KbenrichError::Store(format!(
                "store '{}' cannot read records back",
                self.store.name()
            ))),
        }
    }

    /// After a successful upsert, drop companion records of the written
    /// documents that this write did not replace (e.g. chunks past the new
    /// end of a shrunken document). Failures only leave stale rows behind.
    async fn clear_companion(&self, records: &[StoreRecord]) {
        let Some(content_store) = &self.content_store else {
            return;
        };
        let mut written: BTreeMap<&str, Vec<String>> = BTreeMap::new();
        for record in records {
            written.entry(record.doc_id.as_str()).or_default().push(record.id.clone());
        }
        for (doc_id, keep) in written {
            match content_store.remove_by_doc_id(doc_id, &keep).await {
                Ok(0) => {}
                Ok(removed) => log::debug!("Removed {} stale records of {}", removed, doc_id),
                Err(e) => log::debug!("Could not clear previous records of {}: {}", doc_id, e),
            }
        }
    }
}
