//! Entry point for writes into the knowledge base.
//!
//! Submitted documents go through the [`DocumentProcessor`] when enhanced
//! processing is switched on, and are stored verbatim otherwise. Bulk rows
//! never touch the processor.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::error::{KbenrichError, Result};
use crate::kb::adapter::{KnowledgeBaseAdapter, WriteMode};
use crate::kb::record::{SourceRow, StoreRecord};
use crate::kb::signature::ContentSignature;
use crate::kb::sync::{IncrementalSynchronizer, SyncParams, SyncSummary};
use crate::processing::config::ProcessingConfig;
use crate::processing::processor::DocumentProcessor;
use crate::processing::types::DocumentInput;

/// What happened to one submitted document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitOutcome {
    pub document_id: String,
    pub records_written: usize,
    pub enhanced: bool,
    pub degraded: bool,
}

pub struct KnowledgePipeline {
    adapter: Arc<KnowledgeBaseAdapter>,
    processor: Option<DocumentProcessor>,
    synchronizer: IncrementalSynchronizer,
    timeout: Option<Duration>,
}

impl KnowledgePipeline {
    /// The processor is only built when both the global switch and
    /// `processing.enabled` are on.
    pub fn new(
        adapter: Arc<KnowledgeBaseAdapter>,
        config: Arc<ProcessingConfig>,
        enhanced_processing: bool,
    ) -> Result<Self> {
        let processor = if enhanced_processing && config.processing.enabled {
            Some(DocumentProcessor::new(config)?)
        } else {
            log::info!("Enhanced knowledge processing disabled; documents are stored as submitted");
            None
        };

        Ok(Self {
            synchronizer: IncrementalSynchronizer::new(Arc::clone(&adapter)),
            adapter,
            processor,
            timeout: None,
        })
    }

    /// Bound each document's processing time.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn is_enhanced(&self) -> bool {
        self.processor.is_some()
    }

    pub fn adapter(&self) -> &KnowledgeBaseAdapter {
        &self.adapter
    }

    pub async fn submit(&self, input: DocumentInput, mode: WriteMode) -> Result<SubmitOutcome> {
        let Some(processor) = &self.processor else {
            return self.submit_raw(input, mode).await;
        };

        let doc = match self.timeout {
            Some(limit) => processor.process_with_timeout(input, limit).await?,
            None => processor.process(input).await?,
        };
        let records_written = self.adapter.write(&doc, mode).await?;

        log::info!(
            "Stored document {} as {} chunks (type={}, business_unit={})",
            doc.document_id,
            records_written,
            doc.metadata.document_type,
            doc.metadata.business_unit.as_deref().unwrap_or("general")
        );

        Ok(SubmitOutcome {
            degraded: doc.is_degraded(),
            document_id: doc.document_id,
            records_written,
            enhanced: true,
        })
    }

    /// Store the document byte for byte with its own metadata.
    async fn submit_raw(&self, input: DocumentInput, mode: WriteMode) -> Result<SubmitOutcome> {
        let id = input
            .id
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| KbenrichError::MissingField("id".to_string()))?;
        let content = input
            .content
            .ok_or_else(|| KbenrichError::MissingField("content".to_string()))?;

        let hash = ContentSignature::compute(&id, &content, &Default::default());
        let record = StoreRecord {
            id: id.clone(),
            doc_id: id.clone(),
            source: None,
            content,
            metadata: Value::Object(input.metadata),
            content_hash: Some(hash.into_string()),
        };
        let records_written = self.adapter.write_records(vec![record], mode).await?;
        log::debug!("Stored document {} unprocessed", id);

        Ok(SubmitOutcome {
            document_id: id,
            records_written,
            enhanced: false,
            degraded: false,
        })
    }

    /// Bulk path: rows go straight to the synchronizer.
    pub async fn synchronize(&self, rows: Vec<SourceRow>, params: SyncParams) -> Result<SyncSummary> {
        self.synchronizer.synchronize(rows, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kb::memory_store::InMemoryStore;
    use serde_json::json;

    fn pipeline(store: &Arc<InMemoryStore>, config: ProcessingConfig, enhanced: bool) -> KnowledgePipeline {
        let adapter = Arc::new(KnowledgeBaseAdapter::new(store.clone()));
        KnowledgePipeline::new(adapter, Arc::new(config), enhanced).unwrap()
    }

    fn input() -> DocumentInput {
        let mut input = DocumentInput::new(
            "doc-1",
            "fatura.txt",
            "Fatura PagBank: R$ 13.239,00 com vencimento em 10/08/2025.",
        );
        input.metadata.insert("origin".to_string(), json!("upload"));
        input
    }

    #[tokio::test]
    async fn test_enhanced_path_writes_enriched_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(&store, ProcessingConfig::default(), true);
        assert!(pipeline.is_enhanced());

        let outcome = pipeline.submit(input(), WriteMode::Upsert).await.unwrap();
        assert!(outcome.enhanced);
        assert!(!outcome.degraded);
        assert_eq!(outcome.records_written, 1);

        let record = pipeline.adapter().get("doc-1::0").await.unwrap().unwrap();
        assert_eq!(record.metadata["document_type"], "invoice");
        assert_eq!(record.metadata["business_unit"], "pagbank");
        assert!(record.metadata.get("confidence_score").is_some());
        assert_eq!(record.metadata["origin"], "upload");
    }

    #[tokio::test]
    async fn test_empty_document_is_stored_as_one_chunk() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(&store, ProcessingConfig::default(), true);

        let outcome = pipeline
            .submit(DocumentInput::new("empty", "vazio.txt", ""), WriteMode::Upsert)
            .await
            .unwrap();
        assert_eq!(outcome.records_written, 1);
        assert!(!outcome.degraded);
        let record = pipeline.adapter().get("empty::0").await.unwrap().unwrap();
        assert_eq!(record.content, "");
        assert_eq!(record.metadata["document_type"], "general");
    }

    #[tokio::test]
    async fn test_kill_switch_stores_raw() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(&store, ProcessingConfig::default(), false);
        assert!(!pipeline.is_enhanced());

        let outcome = pipeline.submit(input(), WriteMode::Upsert).await.unwrap();
        assert!(!outcome.enhanced);

        let record = pipeline.adapter().get("doc-1").await.unwrap().unwrap();
        assert_eq!(record.content, input().content.unwrap());
        assert_eq!(record.metadata, json!({"origin": "upload"}));
        assert!(record.metadata.get("document_type").is_none());
    }

    #[tokio::test]
    async fn test_processing_disabled_in_config_stores_raw() {
        let store = Arc::new(InMemoryStore::new());
        let mut config = ProcessingConfig::default();
        config.processing.enabled = false;
        let pipeline = pipeline(&store, config, true);
        assert!(!pipeline.is_enhanced());

        pipeline.submit(input(), WriteMode::Upsert).await.unwrap();
        let record = pipeline.adapter().get("doc-1").await.unwrap().unwrap();
        assert!(record.metadata.get("document_type").is_none());
    }

    #[tokio::test]
    async fn test_raw_path_requires_id_and_content() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(&store, ProcessingConfig::default(), false);
        let mut missing = input();
        missing.content = None;
        let err = pipeline.submit(missing, WriteMode::Insert).await.unwrap_err();
        assert!(matches!(err, KbenrichError::MissingField(ref f) if f == "content"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_bulk_rows_bypass_processor() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(&store, ProcessingConfig::default(), true);
        let rows = vec![SourceRow::new("1", "Fatura PagBank R$ 10,00").with_field("team", "faq")];

        let summary = pipeline.synchronize(rows, SyncParams::for_source("faq")).await.unwrap();
        assert_eq!(summary.inserted, 1);
        let record = pipeline.adapter().get("faq:1").await.unwrap().unwrap();
        assert_eq!(record.metadata, json!({"team": "faq"}));
    }

    #[tokio::test]
    async fn test_timeout_still_stores_minimal_document() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(&store, ProcessingConfig::default(), true).with_timeout(Duration::from_nanos(1));
        let content = "Relatório de despesas do PagBank em 07/2025. ".repeat(20_000);

        let outcome = pipeline
            .submit(DocumentInput::new("big", "relatorio.txt", content), WriteMode::Upsert)
            .await
            .unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.records_written, 1);
        let record = pipeline.adapter().get("big::0").await.unwrap().unwrap();
        assert_eq!(record.metadata["business_unit"], "general");
    }
}
