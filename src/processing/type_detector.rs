//! Document type classification from filename and content signals.

use regex::Regex;

use crate::error::{KbenrichError, Result};
use crate::processing::config::TypeDetectionConfig;
use crate::processing::patterns::keyword_regex;
use crate::processing::types::{DocumentType, TypeDetection};

/// Points for each filename pattern that matches.
const FILENAME_WEIGHT: f32 = 3.0;
/// Points for each content keyword occurrence.
const KEYWORD_WEIGHT: f32 = 1.0;
/// Score at which confidence saturates to 1.0.
const CONFIDENCE_SATURATION: f32 = 10.0;
/// Confidence reported when nothing reached the threshold.
pub const NO_EVIDENCE_CONFIDENCE: f32 = 0.1;

/// Compiled rules for one document type.
#[derive(Debug, Clone)]
pub struct TypeRule {
    pub document_type: DocumentType,
    filename_patterns: Vec<Regex>,
    content_keywords: Vec<Regex>,
}

impl TypeRule {
    fn score(&self, filename: &str, content: &str) -> f32 {
        let filename_hits = if filename.is_empty() {
            0
        } else {
            self.filename_patterns.iter().filter(|re| re.is_match(filename)).count()
        };
        let keyword_hits: usize = self
            .content_keywords
            .iter()
            .map(|re| re.find_iter(content).count())
            .sum();
        filename_hits as f32 * FILENAME_WEIGHT + keyword_hits as f32 * KEYWORD_WEIGHT
    }
}

/// Compile the configured patterns, in declaration order.
///
/// Filename patterns are case-insensitive regexes; content keywords are
/// literals. Any pattern that fails to compile is a configuration error.
pub fn compile_rules(config: &TypeDetectionConfig) -> Result<Vec<TypeRule>> {
    let mut rules = Vec::new();

    for document_type in config.declared_types() {
        let mut filename_patterns = Vec::new();
        for (_, patterns) in config.filename_patterns.iter().filter(|(t, _)| *t == document_type) {
            for pattern in patterns {
                let re = Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
                    KbenrichError::Config(format!(
                        "Invalid filename pattern '{}' for type {}: {}",
                        pattern, document_type, e
                    ))
                })?;
                filename_patterns.push(re);
            }
        }

        let mut content_keywords = Vec::new();
        for (_, keywords) in config.content_keywords.iter().filter(|(t, _)| *t == document_type) {
            for keyword in keywords {
                if keyword.trim().is_empty() {
                    return Err(KbenrichError::Config(format!(
                        "Empty content keyword for type {}",
                        document_type
                    )));
                }
                let re = keyword_regex(keyword).map_err(|e| {
                    KbenrichError::Config(format!(
                        "Invalid content keyword '{}' for type {}: {}",
                        keyword, document_type, e
                    ))
                })?;
                content_keywords.push(re);
            }
        }

        rules.push(TypeRule {
            document_type,
            filename_patterns,
            content_keywords,
        });
    }

    Ok(rules)
}

/// Classifies documents into a [`DocumentType`] with a confidence score.
#[derive(Debug, Clone)]
pub struct TypeDetector {
    rules: Vec<TypeRule>,
    min_score: f32,
}

impl TypeDetector {
    pub fn new(config: &TypeDetectionConfig) -> Result<Self> {
        Ok(Self {
            rules: compile_rules(config)?,
            min_score: config.min_score,
        })
    }

    /// Detect the document type. Never fails.
    ///
    /// Ties go to the type declared first. Empty content is `general` with
    /// confidence 0; content without enough evidence is `general` with a low,
    /// non-zero confidence.
    pub fn detect(&self, filename: &str, content: &str) -> TypeDetection {
        if content.trim().is_empty() {
            return TypeDetection::general(0.0);
        }

        let mut best: Option<(DocumentType, f32)> = None;
        for rule in &self.rules {
            let score = rule.score(filename, content);
            log::trace!("type score {} = {}", rule.document_type, score);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((rule.document_type, score)),
            }
        }

        match best {
            Some((document_type, score)) if score > 0.0 && score >= self.min_score => {
                let confidence = (score / CONFIDENCE_SATURATION).clamp(NO_EVIDENCE_CONFIDENCE, 1.0);
                TypeDetection {
                    document_type,
                    confidence_score: confidence,
                }
            }
            _ => TypeDetection::general(NO_EVIDENCE_CONFIDENCE),
        }
    }
}
