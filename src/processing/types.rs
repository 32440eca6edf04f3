//! Data model shared by the processor stages and the knowledge-base adapter.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KbenrichError;

/// Closed set of document classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Invoice,
    Contract,
    Report,
    Email,
    Faq,
    Manual,
    Specification,
    General,
}

impl DocumentType {
    pub const ALL: [DocumentType; 8] = [
        DocumentType::Invoice,
        DocumentType::Contract,
        DocumentType::Report,
        DocumentType::Email,
        DocumentType::Faq,
        DocumentType::Manual,
        DocumentType::Specification,
        DocumentType::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Invoice => "invoice",
            DocumentType::Contract => "contract",
            DocumentType::Report => "report",
            DocumentType::Email => "email",
            DocumentType::Faq => "faq",
            DocumentType::Manual => "manual",
            DocumentType::Specification => "specification",
            DocumentType::General => "general",
        }
    }

    /// Business category a document type rolls up to.
    pub fn category(&self) -> &'static str {
        match self {
            DocumentType::Invoice | DocumentType::Report => "finance",
            DocumentType::Contract => "legal",
            DocumentType::Email => "communication",
            DocumentType::Faq | DocumentType::Manual => "support",
            DocumentType::Specification => "technical",
            DocumentType::General => "general",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = KbenrichError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        DocumentType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| KbenrichError::InvalidInput(format!("Unknown document type: {}", s)))
    }
}

/// Output of the type detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypeDetection {
    pub document_type: DocumentType,
    pub confidence_score: f32,
}

impl TypeDetection {
    pub fn general(confidence_score: f32) -> Self {
        Self {
            document_type: DocumentType::General,
            confidence_score,
        }
    }
}

/// Entities found in a document. Lists keep first-occurrence order and hold no duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub dates: Vec<String>,
    pub amounts: Vec<f64>,
    pub names: Vec<String>,
    pub organizations: Vec<String>,
    #[serde(default)]
    pub custom: BTreeMap<String, Vec<String>>,
}

impl ExtractedEntities {
    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
            && self.amounts.is_empty()
            && self.names.is_empty()
            && self.organizations.is_empty()
            && self.custom.is_empty()
    }
}

/// Position of a chunk within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub index: usize,
    pub total: usize,
    pub has_table_fragment: bool,
}

/// Metadata attached to a processed document and copied onto each of its chunks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedMetadata {
    pub document_type: DocumentType,
    pub confidence_score: f32,
    pub business_unit: Option<String>,
    pub category: String,
    pub tags: Vec<String>,
    pub extracted_entities: ExtractedEntities,
    pub processing_date: DateTime<Utc>,
    pub source_file: Option<String>,
    pub chunk_info: Option<ChunkInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
}

impl EnhancedMetadata {
    /// Metadata for a document that could not be analysed.
    pub fn minimal(processed_at: DateTime<Utc>, error: impl Into<String>) -> Self {
        Self {
            document_type: DocumentType::General,
            confidence_score: 0.0,
            business_unit: Some(crate::processing::GENERAL_BUSINESS_UNIT.to_string()),
            category: DocumentType::General.category().to_string(),
            tags: Vec::new(),
            extracted_entities: ExtractedEntities::default(),
            processing_date: processed_at,
            source_file: None,
            chunk_info: None,
            processing_error: Some(error.into()),
        }
    }

    /// First extracted date, exposed to retrieval filters as `document_date`.
    pub fn document_date(&self) -> Option<&str> {
        self.extracted_entities.dates.first().map(String::as_str)
    }
}

/// A bounded segment of a processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: EnhancedMetadata,
}

impl Chunk {
    pub fn info(&self) -> Option<ChunkInfo> {
        self.metadata.chunk_info
    }
}

/// A document submitted for processing. `id`, `name` and `content` are required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentInput {
    pub id: Option<String>,
    pub name: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub source_file: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl DocumentInput {
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            content: Some(content.into()),
            source_file: None,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }
}

/// Result of one processing pass. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedDocument {
    pub document_id: String,
    pub document_name: String,
    pub original_content: String,
    pub metadata: EnhancedMetadata,
    pub chunks: Vec<Chunk>,
    /// Caller metadata from [`DocumentInput::metadata`], passed through to storage.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub input_metadata: serde_json::Map<String, serde_json::Value>,
}

impl ProcessedDocument {
    pub fn is_degraded(&self) -> bool {
        self.metadata.processing_error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_round_trip_names() {
        for t in DocumentType::ALL {
            assert_eq!(t.as_str().parse::<DocumentType>().unwrap(), t);
        }
        assert_eq!(" Invoice ".parse::<DocumentType>().unwrap(), DocumentType::Invoice);
        assert!("memo".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_document_type_serde_lowercase() {
        let json = serde_json::to_string(&DocumentType::Specification).unwrap();
        assert_eq!(json, "\"specification\"");
    }

    #[test]
    fn test_categories() {
        assert_eq!(DocumentType::Invoice.category(), "finance");
        assert_eq!(DocumentType::Report.category(), "finance");
        assert_eq!(DocumentType::Contract.category(), "legal");
        assert_eq!(DocumentType::General.category(), "general");
    }

    #[test]
    fn test_minimal_metadata() {
        let meta = EnhancedMetadata::minimal(Utc::now(), "boom");
        assert_eq!(meta.document_type, DocumentType::General);
        assert_eq!(meta.confidence_score, 0.0);
        assert_eq!(meta.business_unit.as_deref(), Some("general"));
        assert_eq!(meta.processing_error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_document_input_deserialize_partial() {
        let input: DocumentInput = serde_json::from_str(r#"{"id": "d1", "content": "x"}"#).unwrap();
        assert_eq!(input.id.as_deref(), Some("d1"));
        assert!(input.name.is_none());
        assert!(input.metadata.is_empty());
    }
}
