//! Document analysis: type detection, entity extraction, enrichment and chunking.

pub mod chunker;
pub mod config;
pub mod enricher;
pub mod entity_extractor;
pub mod patterns;
pub mod processor;
pub mod type_detector;
pub mod types;

pub use chunker::SemanticChunker;
pub use config::ProcessingConfig;
pub use enricher::MetadataEnricher;
pub use entity_extractor::EntityExtractor;
pub use processor::DocumentProcessor;
pub use type_detector::TypeDetector;
pub use types::{
    Chunk, ChunkInfo, DocumentInput, DocumentType, EnhancedMetadata, ExtractedEntities, ProcessedDocument,
    TypeDetection,
};

/// Business unit assigned when no configured unit scores high enough.
pub const GENERAL_BUSINESS_UNIT: &str = "general";
