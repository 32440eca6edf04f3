//! Business-unit attribution and tagging on top of the type and entity results.

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{KbenrichError, Result};
use crate::processing::config::BusinessUnitConfig;
use crate::processing::patterns::keyword_regex;
use crate::processing::types::{DocumentType, EnhancedMetadata, ExtractedEntities, TypeDetection};
use crate::processing::GENERAL_BUSINESS_UNIT;

/// Extra weight multiplier when an organization entity mentions a keyword.
const ORGANIZATION_BONUS: f32 = 2.0;

#[derive(Debug, Clone)]
struct UnitKeyword {
    keyword: String,
    matcher: Regex,
    weight: f32,
}

#[derive(Debug, Clone)]
struct BusinessUnitRule {
    name: String,
    keywords: Vec<UnitKeyword>,
}

/// Business unit score plus the keywords that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitScore {
    pub unit: String,
    pub score: f32,
    pub matched_keywords: Vec<String>,
}

/// Derives business unit, category and tags from detection results.
#[derive(Debug, Clone)]
pub struct MetadataEnricher {
    min_score: f32,
    max_tags: usize,
    units: Vec<BusinessUnitRule>,
}

impl MetadataEnricher {
    pub fn new(config: &BusinessUnitConfig) -> Result<Self> {
        let mut units = Vec::with_capacity(config.business_unit_keywords.len());
        for (name, specs) in &config.business_unit_keywords {
            let mut keywords = Vec::with_capacity(specs.len());
            for spec in specs {
                let matcher = keyword_regex(spec.keyword()).map_err(|e| {
                    KbenrichError::Config(format!(
                        "Invalid keyword '{}' for business unit {}: {}",
                        spec.keyword(),
                        name,
                        e
                    ))
                })?;
                keywords.push(UnitKeyword {
                    keyword: spec.keyword().trim().to_lowercase(),
                    matcher,
                    weight: spec.weight(),
                });
            }
            units.push(BusinessUnitRule {
                name: name.clone(),
                keywords,
            });
        }

        Ok(Self {
            min_score: config.min_score,
            max_tags: config.max_tags,
            units,
        })
    }

    /// Score every configured unit, in declaration order.
    pub fn score_units(&self, content: &str, organizations: &[String]) -> Vec<UnitScore> {
        self.units
            .iter()
            .map(|unit| {
                let mut score = 0.0;
                let mut matched_keywords = Vec::new();
                for keyword in &unit.keywords {
                    let occurrences = keyword.matcher.find_iter(content).count();
                    let org_hits = organizations
                        .iter()
                        .filter(|org| keyword.matcher.is_match(org))
                        .count();
                    if occurrences + org_hits == 0 {
                        continue;
                    }
                    score += keyword.weight * occurrences as f32;
                    score += ORGANIZATION_BONUS * keyword.weight * org_hits as f32;
                    matched_keywords.push(keyword.keyword.clone());
                }
                UnitScore {
                    unit: unit.name.clone(),
                    score,
                    matched_keywords,
                }
            })
            .collect()
    }

    /// Build the enhanced metadata for one document. Pure: the processing
    /// timestamp is supplied by the caller.
    pub fn enrich(
        &self,
        detection: TypeDetection,
        entities: ExtractedEntities,
        content: &str,
        processed_at: DateTime<Utc>,
    ) -> EnhancedMetadata {
        let scores = self.score_units(content, &entities.organizations);

        let mut best: Option<&UnitScore> = None;
        for candidate in &scores {
            if candidate.score <= 0.0 || candidate.score < self.min_score {
                continue;
            }
            if best.map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        let business_unit = best
            .map(|b| b.unit.clone())
            .unwrap_or_else(|| GENERAL_BUSINESS_UNIT.to_string());
        let matched_keywords = best.map(|b| b.matched_keywords.as_slice()).unwrap_or(&[]);

        let tags = self.build_tags(detection.document_type, &business_unit, matched_keywords, &entities);

        log::debug!(
            "Enriched: type={} confidence={:.2} business_unit={} tags={}",
            detection.document_type,
            detection.confidence_score,
            business_unit,
            tags.len()
        );

        EnhancedMetadata {
            document_type: detection.document_type,
            confidence_score: detection.confidence_score.clamp(0.0, 1.0),
            business_unit: Some(business_unit),
            category: detection.document_type.category().to_string(),
            tags,
            extracted_entities: entities,
            processing_date: processed_at,
            source_file: None,
            chunk_info: None,
            processing_error: None,
        }
    }

    fn build_tags(
        &self,
        document_type: DocumentType,
        business_unit: &str,
        matched_keywords: &[String],
        entities: &ExtractedEntities,
    ) -> Vec<String> {
        let mut candidates: Vec<String> = vec![document_type.as_str().to_string()];
        if business_unit != GENERAL_BUSINESS_UNIT {
            candidates.push(business_unit.to_string());
        }
        candidates.extend(matched_keywords.iter().cloned());
        if !entities.dates.is_empty() {
            candidates.push("has_dates".to_string());
        }
        if !entities.amounts.is_empty() {
            candidates.push("has_amounts".to_string());
        }
        if !entities.organizations.is_empty() {
            candidates.push("has_organizations".to_string());
        }

        let mut tags: Vec<String> = Vec::new();
        for tag in candidates {
            if tags.len() >= self.max_tags {
                break;
            }
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }
        tags
    }
}
