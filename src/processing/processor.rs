//! Document processor: runs the analysis stages over one document and
//! assembles the [`ProcessedDocument`].
//!
//! Type detection and entity extraction are independent and run side by side
//! on the blocking pool. Enrichment and chunking follow. A failing stage never
//! fails the call: the document degrades to a single general chunk instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::task;

use crate::error::{KbenrichError, Result};
use crate::processing::chunker::SemanticChunker;
use crate::processing::config::ProcessingConfig;
use crate::processing::enricher::MetadataEnricher;
use crate::processing::entity_extractor::EntityExtractor;
use crate::processing::type_detector::TypeDetector;
use crate::processing::types::{Chunk, ChunkInfo, DocumentInput, EnhancedMetadata, ProcessedDocument};

/// Validated document fields.
#[derive(Debug, Clone)]
struct Submission {
    id: String,
    name: String,
    content: String,
    source_file: Option<String>,
    input_metadata: Map<String, Value>,
}

impl Submission {
    /// `id` and `name` must be non-blank; `content` only has to be present.
    fn from_input(input: DocumentInput) -> Result<Self> {
        Ok(Self {
            id: required(input.id, "id")?,
            name: required(input.name, "name")?,
            content: input
                .content
                .ok_or_else(|| KbenrichError::MissingField("content".to_string()))?,
            source_file: input.source_file,
            input_metadata: input.metadata,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(KbenrichError::MissingField(field.to_string())),
    }
}

pub struct DocumentProcessor {
    config: Arc<ProcessingConfig>,
    detector: Arc<TypeDetector>,
    extractor: Arc<EntityExtractor>,
    enricher: MetadataEnricher,
    chunker: SemanticChunker,
}

impl DocumentProcessor {
    /// Build every stage from a validated configuration.
    pub fn new(config: Arc<ProcessingConfig>) -> Result<Self> {
        let detector = TypeDetector::new(&config.type_detection)?;
        let extractor = EntityExtractor::new(&config.entity_extraction);
        let enricher = MetadataEnricher::new(&config.business_unit_detection)?;
        let chunker = SemanticChunker::new(&config.chunking);

        Ok(Self {
            config,
            detector: Arc::new(detector),
            extractor: Arc::new(extractor),
            enricher,
            chunker,
        })
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Process one document.
    ///
    /// Only a missing or blank `id` or `name`, or absent `content`, is an
    /// error; every stage failure yields the minimal document.
    pub async fn process(&self, input: DocumentInput) -> Result<ProcessedDocument> {
        let submission = Submission::from_input(input)?;
        let processed_at = Utc::now();

        let outcome = self.analyse(&submission, processed_at).await;
        Ok(self.assemble(submission, processed_at, outcome))
    }

    /// Like [`process`](Self::process), but a stage run that outlives
    /// `limit` is treated as a stage failure.
    pub async fn process_with_timeout(&self, input: DocumentInput, limit: Duration) -> Result<ProcessedDocument> {
        let submission = Submission::from_input(input)?;
        let processed_at = Utc::now();

        let outcome = match tokio::time::timeout(limit, self.analyse(&submission, processed_at)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(KbenrichError::Processing(format!(
                "processing timed out after {} ms",
                limit.as_millis()
            ))),
        };
        Ok(self.assemble(submission, processed_at, outcome))
    }

    async fn analyse(
        &self,
        submission: &Submission,
        processed_at: DateTime<Utc>,
    ) -> Result<(EnhancedMetadata, Vec<Chunk>)> {
        let content: Arc<str> = Arc::from(submission.content.as_str());

        let detect = {
            let detector = Arc::clone(&self.detector);
            let content = Arc::clone(&content);
            let filename = submission.name.clone();
            task::spawn_blocking(move || detector.detect(&filename, &content))
        };
        let extract = {
            let extractor = Arc::clone(&self.extractor);
            let content = Arc::clone(&content);
            task::spawn_blocking(move || extractor.extract(&content))
        };

        let (detection, entities) = tokio::join!(detect, extract);
        let detection =
            detection.map_err(|e| KbenrichError::Processing(format!("type detection failed: {}", e)))?;
        let entities =
            entities.map_err(|e| KbenrichError::Processing(format!("entity extraction failed: {}", e)))?;

        log::debug!(
            "Document {}: type={} ({:.2}), {} dates, {} amounts, {} organizations",
            submission.id,
            detection.document_type,
            detection.confidence_score,
            entities.dates.len(),
            entities.amounts.len(),
            entities.organizations.len()
        );

        let mut metadata = self.enricher.enrich(detection, entities, &content, processed_at);
        metadata.source_file = submission.source_file.clone();

        let chunks = self.chunker.chunk(&content, &metadata)?;
        Ok((metadata, chunks))
    }

    fn assemble(
        &self,
        submission: Submission,
        processed_at: DateTime<Utc>,
        outcome: Result<(EnhancedMetadata, Vec<Chunk>)>,
    ) -> ProcessedDocument {
        match outcome {
            Ok((metadata, chunks)) => ProcessedDocument {
                document_id: submission.id,
                document_name: submission.name,
                original_content: submission.content,
                metadata,
                chunks,
                input_metadata: submission.input_metadata,
            },
            Err(e) => {
                log::error!("Processing failed for document {}: {}", submission.id, e);
                minimal_document(submission, processed_at, &e)
            }
        }
    }
}

/// The degraded result: the original content as one general chunk.
fn minimal_document(submission: Submission, processed_at: DateTime<Utc>, error: &KbenrichError) -> ProcessedDocument {
    let mut metadata = EnhancedMetadata::minimal(processed_at, error.to_string());
    metadata.source_file = submission.source_file;

    let mut chunk_metadata = metadata.clone();
    chunk_metadata.chunk_info = Some(ChunkInfo {
        index: 0,
        total: 1,
        has_table_fragment: false,
    });

    ProcessedDocument {
        document_id: submission.id,
        document_name: submission.name,
        chunks: vec![Chunk {
            content: submission.content.clone(),
            metadata: chunk_metadata,
        }],
        original_content: submission.content,
        metadata,
        input_metadata: submission.input_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::types::DocumentType;

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(Arc::new(ProcessingConfig::default())).unwrap()
    }

    #[tokio::test]
    async fn test_reference_document() {
        let input = DocumentInput::new(
            "doc-1",
            "despesas_julho.txt",
            "Despesas 07/2025: R$ 13.239,00. João Silva, PagBank Ltda.",
        );
        let doc = processor().process(input).await.unwrap();

        assert!(!doc.is_degraded());
        assert!(matches!(
            doc.metadata.document_type,
            DocumentType::Invoice | DocumentType::Report
        ));
        assert_eq!(doc.metadata.business_unit.as_deref(), Some("pagbank"));
        assert_eq!(doc.metadata.extracted_entities.dates, vec!["07/2025".to_string()]);
        assert_eq!(doc.metadata.extracted_entities.amounts, vec![13239.0]);
        assert!(doc.metadata.extracted_entities.names.contains(&"João Silva".to_string()));
        assert!(doc
            .metadata
            .extracted_entities
            .organizations
            .contains(&"PagBank Ltda.".to_string()));
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.chunks[0].metadata.business_unit, doc.metadata.business_unit);
    }

    #[tokio::test]
    async fn test_empty_content_yields_one_general_chunk() {
        for content in ["", "   "] {
            let doc = processor()
                .process(DocumentInput::new("doc-1", "empty.txt", content))
                .await
                .unwrap();

            assert!(!doc.is_degraded());
            assert_eq!(doc.metadata.document_type, DocumentType::General);
            assert_eq!(doc.metadata.confidence_score, 0.0);
            assert_eq!(doc.metadata.business_unit.as_deref(), Some("general"));
            assert_eq!(doc.chunks.len(), 1);
            assert_eq!(doc.chunks[0].metadata.chunk_info.unwrap().total, 1);
        }
    }

    #[tokio::test]
    async fn test_absent_content_is_missing_field() {
        let mut input = DocumentInput::new("doc-1", "a.txt", "");
        input.content = None;
        let err = processor().process(input).await.unwrap_err();
        assert!(matches!(err, KbenrichError::MissingField(ref f) if f == "content"));
    }

    #[tokio::test]
    async fn test_input_metadata_is_carried() {
        let mut input = DocumentInput::new("doc-5", "notas.txt", "Notas da reunião.");
        input.metadata.insert("origin".to_string(), Value::from("upload"));
        let doc = processor().process(input).await.unwrap();
        assert_eq!(doc.input_metadata.get("origin"), Some(&Value::from("upload")));
    }

    #[tokio::test]
    async fn test_missing_id_and_name() {
        let mut input = DocumentInput::new("doc-1", "a.txt", "texto");
        input.id = None;
        let err = processor().process(input).await.unwrap_err();
        assert_eq!(err.to_string(), "Missing required field: id");

        let mut input = DocumentInput::new("doc-1", "a.txt", "texto");
        input.name = Some(String::new());
        let err = processor().process(input).await.unwrap_err();
        assert!(matches!(err, KbenrichError::MissingField(ref f) if f == "name"));
    }

    #[tokio::test]
    async fn test_source_file_propagates_to_chunks() {
        let input = DocumentInput::new("doc-2", "manual.md", "Passo a passo do manual.")
            .with_source_file("docs/manual.md");
        let doc = processor().process(input).await.unwrap();
        assert_eq!(doc.metadata.source_file.as_deref(), Some("docs/manual.md"));
        for chunk in &doc.chunks {
            assert_eq!(chunk.metadata.source_file.as_deref(), Some("docs/manual.md"));
            assert!(chunk.metadata.chunk_info.is_some());
        }
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_minimal_document() {
        let content = "Fatura de João Silva no valor de R$ 1.234,56 em 01/02/2025. ".repeat(20_000);
        let input = DocumentInput::new("doc-3", "fatura.txt", content.clone());
        let doc = processor()
            .process_with_timeout(input, Duration::from_nanos(1))
            .await
            .unwrap();

        assert!(doc.is_degraded());
        assert_eq!(doc.metadata.document_type, DocumentType::General);
        assert_eq!(doc.metadata.confidence_score, 0.0);
        assert_eq!(doc.metadata.business_unit.as_deref(), Some("general"));
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.chunks[0].content, content);
        assert!(doc.metadata.processing_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_generous_timeout_processes_normally() {
        let input = DocumentInput::new("doc-4", "contrato.txt", "Contrato entre contratante e contratada.");
        let doc = processor()
            .process_with_timeout(input, Duration::from_secs(30))
            .await
            .unwrap();
        assert!(!doc.is_degraded());
        assert_eq!(doc.metadata.document_type, DocumentType::Contract);
    }

    #[test]
    fn test_minimal_document_shape() {
        let submission = Submission {
            id: "d".to_string(),
            name: "n".to_string(),
            content: "conteúdo original".to_string(),
            source_file: Some("n.txt".to_string()),
            input_metadata: Map::new(),
        };
        let err = KbenrichError::Processing("chunker exploded".to_string());
        let doc = minimal_document(submission, Utc::now(), &err);
        assert_eq!(doc.chunks.len(), 1);
        assert_eq!(doc.chunks[0].content, "conteúdo original");
        assert_eq!(doc.chunks[0].metadata.chunk_info.unwrap().total, 1);
        assert_eq!(doc.metadata.source_file.as_deref(), Some("n.txt"));
        assert!(doc.metadata.processing_error.unwrap().contains("chunker exploded"));
    }
}
