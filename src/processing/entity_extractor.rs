//! Entity extraction: dates, currency amounts, personal names, organizations
//! and user-defined entity families.

use std::collections::HashSet;
use std::ops::Range;

use regex::Regex;

use crate::processing::config::{CustomEntityConfig, EntityExtractionConfig};
use crate::processing::patterns::{self, collapse_whitespace, keyword_regex};
use crate::processing::types::ExtractedEntities;

/// A custom entity family whose matchers all compiled.
#[derive(Debug, Clone)]
struct CustomFamily {
    name: String,
    matchers: Vec<Regex>,
}

/// Scans content for structured entities. Each family is toggled by config.
#[derive(Debug, Clone)]
pub struct EntityExtractor {
    enable_dates: bool,
    enable_amounts: bool,
    enable_names: bool,
    enable_organizations: bool,
    custom: Vec<CustomFamily>,
}

impl EntityExtractor {
    /// Build the extractor. A custom family with a malformed regex is
    /// logged and left out; the rest of the extractor is unaffected.
    pub fn new(config: &EntityExtractionConfig) -> Self {
        let custom = config
            .custom_entities
            .iter()
            .filter_map(|definition| match compile_family(definition) {
                Ok(family) => Some(family),
                Err(e) => {
                    log::warn!("Skipping custom entity '{}': {}", definition.name, e);
                    None
                }
            })
            .collect();

        Self {
            enable_dates: config.enable_dates,
            enable_amounts: config.enable_amounts,
            enable_names: config.enable_names,
            enable_organizations: config.enable_organizations,
            custom,
        }
    }

    pub fn extract(&self, content: &str) -> ExtractedEntities {
        let mut entities = ExtractedEntities::default();
        if content.trim().is_empty() {
            return entities;
        }

        if self.enable_dates {
            entities.dates = extract_dates(content);
        }
        if self.enable_amounts {
            entities.amounts = extract_amounts(content);
        }
        if self.enable_names {
            entities.names = extract_names(content);
        }
        if self.enable_organizations {
            entities.organizations = extract_organizations(content);
        }

        for family in &self.custom {
            let mut seen = HashSet::new();
            let mut found = Vec::new();
            for matcher in &family.matchers {
                for m in matcher.find_iter(content) {
                    let text = collapse_whitespace(m.as_str());
                    if !text.is_empty() && seen.insert(text.clone()) {
                        found.push(text);
                    }
                }
            }
            if !found.is_empty() {
                entities.custom.insert(family.name.clone(), found);
            }
        }

        entities
    }
}

fn compile_family(definition: &CustomEntityConfig) -> Result<CustomFamily, regex::Error> {
    let mut matchers = Vec::new();
    for pattern in definition.patterns.iter().filter(|p| !p.trim().is_empty()) {
        matchers.push(keyword_regex(pattern)?);
    }
    if let Some(raw) = &definition.regex {
        matchers.push(Regex::new(raw)?);
    }
    Ok(CustomFamily {
        name: definition.name.clone(),
        matchers,
    })
}

fn push_unique(list: &mut Vec<String>, seen: &mut HashSet<String>, value: String) {
    if seen.insert(value.clone()) {
        list.push(value);
    }
}

fn overlaps(span: &Range<usize>, taken: &[Range<usize>]) -> bool {
    taken.iter().any(|t| span.start < t.end && t.start < span.end)
}

fn valid_day_month(day: u32, month: u32) -> bool {
    (1..=31).contains(&day) && (1..=12).contains(&month)
}

fn extract_dates(content: &str) -> Vec<String> {
    let mut dates = Vec::new();
    let mut seen = HashSet::new();
    let mut full_spans = Vec::new();

    for caps in patterns::FULL_DATE.captures_iter(content) {
        let (Ok(day), Ok(month)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
            continue;
        };
        if let Some(m) = caps.get(0) {
            full_spans.push(m.range());
        }
        if valid_day_month(day, month) {
            push_unique(&mut dates, &mut seen, format!("{:02}/{:02}/{}", day, month, &caps[3]));
        }
    }

    for caps in patterns::MONTH_YEAR.captures_iter(content) {
        let Some(m) = caps.get(0) else { continue };
        if overlaps(&m.range(), &full_spans) {
            continue;
        }
        match caps[1].parse::<u32>() {
            Ok(month) if (1..=12).contains(&month) => {
                push_unique(&mut dates, &mut seen, format!("{:02}/{}", month, &caps[2]));
            }
            _ => {}
        }
    }

    for caps in patterns::ISO_DATE.captures_iter(content) {
        let (Ok(month), Ok(day)) = (caps[2].parse::<u32>(), caps[3].parse::<u32>()) else {
            continue;
        };
        if valid_day_month(day, month) {
            push_unique(&mut dates, &mut seen, caps[0].to_string());
        }
    }

    for re in [&*patterns::SPELLED_DATE_PT, &*patterns::SPELLED_DATE_EN] {
        for m in re.find_iter(content) {
            push_unique(&mut dates, &mut seen, collapse_whitespace(m.as_str()).to_lowercase());
        }
    }

    dates
}

/// `13.239,00` → 13239.0
fn parse_brl(raw: &str) -> Option<f64> {
    raw.replace('.', "").replace(',', ".").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `1,234.56` → 1234.56
fn parse_usd(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

fn push_amount(amounts: &mut Vec<f64>, value: f64) {
    if !amounts.iter().any(|a| (a - value).abs() < f64::EPSILON) {
        amounts.push(value);
    }
}

fn extract_amounts(content: &str) -> Vec<f64> {
    let mut amounts = Vec::new();
    let mut brl_spans = Vec::new();

    for caps in patterns::BRL_AMOUNT.captures_iter(content) {
        if let Some(m) = caps.get(0) {
            brl_spans.push(m.range());
        }
        match parse_brl(&caps[1]) {
            Some(value) => push_amount(&mut amounts, value),
            None => log::debug!("Skipping malformed amount: {}", &caps[0]),
        }
    }

    for caps in patterns::USD_AMOUNT.captures_iter(content) {
        let Some(m) = caps.get(0) else { continue };
        // "$ 13.239" inside "R$ 13.239,00" was already read as BRL
        if overlaps(&m.range(), &brl_spans) {
            continue;
        }
        match parse_usd(&caps[1]) {
            Some(value) => push_amount(&mut amounts, value),
            None => log::debug!("Skipping malformed amount: {}", &caps[0]),
        }
    }

    amounts
}

fn extract_names(content: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut seen = HashSet::new();

    for m in patterns::CAPITALIZED_NAME.find_iter(content) {
        let candidate = collapse_whitespace(m.as_str());
        let tokens: Vec<&str> = candidate.split(' ').collect();
        if tokens.iter().any(|t| patterns::ORG_TOKENS.contains(t)) {
            continue;
        }

        // drop leading sentence words ("Prezado João Silva" -> "João Silva")
        let start = tokens
            .iter()
            .position(|t| !patterns::NAME_STOPWORDS.contains(t))
            .unwrap_or(tokens.len());
        let kept = &tokens[start..];
        let capitalized = kept
            .iter()
            .filter(|t| t.chars().next().is_some_and(|c| c.is_uppercase()))
            .count();
        if capitalized < 2 || kept.iter().any(|t| patterns::NAME_STOPWORDS.contains(t)) {
            continue;
        }

        push_unique(&mut names, &mut seen, kept.join(" "));
    }

    names
}

fn extract_organizations(content: &str) -> Vec<String> {
    let mut organizations = Vec::new();
    let mut seen = HashSet::new();

    for re in [&*patterns::ORG_WITH_SUFFIX, &*patterns::ORG_WITH_PREFIX] {
        for m in re.find_iter(content) {
            push_unique(&mut organizations, &mut seen, collapse_whitespace(m.as_str()));
        }
    }

    organizations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::config::ProcessingConfig;

    fn extractor() -> EntityExtractor {
        EntityExtractor::new(&ProcessingConfig::default().entity_extraction)
    }

    #[test]
    fn test_reference_sentence() {
        let entities = extractor().extract("Despesas 07/2025: R$ 13.239,00. João Silva, PagBank Ltda.");
        assert_eq!(entities.dates, vec!["07/2025".to_string()]);
        assert_eq!(entities.amounts, vec![13239.0]);
        assert!(entities.names.contains(&"João Silva".to_string()));
        assert!(entities.organizations.contains(&"PagBank Ltda.".to_string()));
        assert!(entities.custom.is_empty());
    }

    #[test]
    fn test_full_date_not_double_counted() {
        let entities = extractor().extract("Vencimento em 5/7/2025 e novamente 05/07/2025.");
        assert_eq!(entities.dates, vec!["05/07/2025".to_string()]);
    }

    #[test]
    fn test_spelled_and_iso_dates() {
        let entities = extractor().extract("Assinado em 15 de Julho de 2025, vigente até 2026-01-31. Signed July 15, 2025.");
        assert!(entities.dates.contains(&"15 de julho de 2025".to_string()));
        assert!(entities.dates.contains(&"2026-01-31".to_string()));
        assert!(entities.dates.contains(&"july 15, 2025".to_string()));
    }

    #[test]
    fn test_invalid_month_skipped() {
        let entities = extractor().extract("Código 13/2025 e 31/13/2024");
        assert!(entities.dates.is_empty());
    }

    #[test]
    fn test_amount_formats_and_dedup() {
        let entities = extractor().extract("R$ 1.500,50 e R$1500,50, depois US$ 2,000.25 e $30");
        assert_eq!(entities.amounts, vec![1500.5, 2000.25, 30.0]);
    }

    #[test]
    fn test_names_filter_stopwords_and_orgs() {
        let entities = extractor().extract("Prezado Carlos Pereira, o Banco do Brasil e Acme Corp. responderam. Maria de Souza assina.");
        assert!(entities.names.contains(&"Carlos Pereira".to_string()));
        assert!(entities.names.contains(&"Maria de Souza".to_string()));
        assert!(!entities.names.iter().any(|n| n.contains("Banco")));
        assert!(entities.organizations.contains(&"Banco do Brasil".to_string()));
        assert!(entities.organizations.contains(&"Acme Corp.".to_string()));
    }

    #[test]
    fn test_families_can_be_disabled() {
        let mut config = ProcessingConfig::default().entity_extraction;
        config.enable_dates = false;
        config.enable_names = false;
        let entities = EntityExtractor::new(&config).extract("João Silva pagou R$ 10,00 em 01/2025");
        assert!(entities.dates.is_empty());
        assert!(entities.names.is_empty());
        assert_eq!(entities.amounts, vec![10.0]);
    }

    #[test]
    fn test_custom_entities() {
        let yaml = r#"
entity_extraction:
  custom_entities:
    - name: produto
      patterns: ["maquininha", "conta digital"]
    - name: protocolo
      regex: "PROT-\\d{4}"
"#;
        let config = ProcessingConfig::from_yaml_str(yaml).unwrap();
        let extractor = EntityExtractor::new(&config.entity_extraction);
        let entities = extractor.extract("Maquininha e Conta  Digital, protocolos PROT-0001 e PROT-0001 e PROT-0002");
        assert_eq!(entities.custom["produto"], vec!["Maquininha".to_string(), "Conta Digital".to_string()]);
        assert_eq!(entities.custom["protocolo"], vec!["PROT-0001".to_string(), "PROT-0002".to_string()]);
    }

    #[test]
    fn test_malformed_custom_regex_only_drops_family() {
        let yaml = r#"
entity_extraction:
  custom_entities:
    - name: broken
      regex: "CT-(\\d+"
    - name: produto
      patterns: ["pix"]
"#;
        let config = ProcessingConfig::from_yaml_str(yaml).unwrap();
        let extractor = EntityExtractor::new(&config.entity_extraction);
        let entities = extractor.extract("Despesas 07/2025: R$ 13.239,00 via pix. João Silva, PagBank Ltda. CT-(12");
        assert_eq!(entities.dates, vec!["07/2025".to_string()]);
        assert_eq!(entities.amounts, vec![13239.0]);
        assert!(entities.names.contains(&"João Silva".to_string()));
        assert!(!entities.custom.contains_key("broken"));
        assert_eq!(entities.custom["produto"], vec!["pix".to_string()]);
    }

    #[test]
    fn test_empty_content() {
        assert!(extractor().extract("").is_empty());
    }
}
