//! Processing configuration: YAML rules for type detection, entity extraction,
//! chunking and business-unit detection.
//!
//! Load precedence:
//! 1. Path in the `KBENRICH_PROCESSING_CONFIG` environment variable
//! 2. Override path from the global settings (`processing_config_path`)
//! 3. Checked-in `config/knowledge_processing.yaml`
//! 4. Built-in defaults
//!
//! Explicit paths (1 and 2) must exist. Every YAML section is optional and
//! falls back to its built-in defaults.

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::error::{KbenrichError, Result};
use crate::processing::types::DocumentType;

/// Environment variable holding an explicit processing config path.
pub const ENV_PROCESSING_CONFIG: &str = "KBENRICH_PROCESSING_CONFIG";

/// Checked-in default location, relative to the working directory.
pub const DEFAULT_PROCESSING_CONFIG_PATH: &str = "config/knowledge_processing.yaml";

/// Root of the processing configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub processing: ProcessingToggle,
    pub type_detection: TypeDetectionConfig,
    pub entity_extraction: EntityExtractionConfig,
    pub chunking: ChunkingConfig,
    pub business_unit_detection: BusinessUnitConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProcessingToggle {
    pub enabled: bool,
}

impl Default for ProcessingToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Type detection rules. Map order in the YAML is preserved and breaks ties.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TypeDetectionConfig {
    pub min_score: f32,
    #[serde(deserialize_with = "ordered_map")]
    pub filename_patterns: Vec<(DocumentType, Vec<String>)>,
    #[serde(deserialize_with = "ordered_map")]
    pub content_keywords: Vec<(DocumentType, Vec<String>)>,
}

impl TypeDetectionConfig {
    /// Types in declaration order: filename pattern keys first, then any
    /// type that only has content keywords.
    pub fn declared_types(&self) -> Vec<DocumentType> {
        let mut types: Vec<DocumentType> = Vec::new();
        for (t, _) in self.filename_patterns.iter().chain(self.content_keywords.iter()) {
            if !types.contains(t) {
                types.push(*t);
            }
        }
        types
    }
}

impl Default for TypeDetectionConfig {
    fn default() -> Self {
        Self {
            min_score: 1.0,
            filename_patterns: vec![
                (DocumentType::Invoice, words(&["fatura", "invoice", r"nota[-_ ]?fiscal", r"\bnfe?\b", "boleto", "recibo"])),
                (DocumentType::Contract, words(&["contrato", "contract", "acordo", "agreement"])),
                (DocumentType::Report, words(&["relat[oó]rio", "report", r"balan[cç]o", "despesas", r"\bdre\b"])),
                (DocumentType::Email, words(&[r"\.eml$", r"\.msg$", "e-?mail"])),
                (DocumentType::Faq, words(&["faq", "perguntas"])),
                (DocumentType::Manual, words(&["manual", "guia", "guide", "tutorial", "handbook"])),
                (DocumentType::Specification, words(&["spec", r"especifica[cç][aã]o", "requisitos", "requirements"])),
            ],
            content_keywords: vec![
                (DocumentType::Invoice, words(&["fatura", "invoice", "nota fiscal", "vencimento", "boleto", "valor total", "cobrança", "r$"])),
                (DocumentType::Contract, words(&["contrato", "contratante", "contratada", "cláusula", "agreement", "clause", "vigência", "rescisão"])),
                (DocumentType::Report, words(&["relatório", "report", "despesas", "receitas", "análise", "resultado", "balanço", "período"])),
                (DocumentType::Email, words(&["assunto:", "subject:", "prezado", "prezada", "atenciosamente", "regards", "dear"])),
                (DocumentType::Faq, words(&["faq", "perguntas frequentes", "pergunta", "resposta", "question", "answer"])),
                (DocumentType::Manual, words(&["manual", "passo a passo", "instruções", "instructions", "procedimento", "step"])),
                (DocumentType::Specification, words(&["especificação", "requisito", "requirement", "endpoint", "deve suportar", "shall"])),
            ],
        }
    }
}

/// A user-defined entity family.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomEntityConfig {
    pub name: String,
    /// Literal keywords, matched case-insensitively on word boundaries.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Raw regular expression. Compiled by the extractor; a bad one drops the family.
    #[serde(default)]
    pub regex: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EntityExtractionConfig {
    pub enable_dates: bool,
    pub enable_amounts: bool,
    pub enable_names: bool,
    pub enable_organizations: bool,
    pub custom_entities: Vec<CustomEntityConfig>,
}

impl Default for EntityExtractionConfig {
    fn default() -> Self {
        Self {
            enable_dates: true,
            enable_amounts: true,
            enable_names: true,
            enable_organizations: true,
            custom_entities: Vec::new(),
        }
    }
}

/// Chunk size bounds, in characters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub preserve_tables: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_size: 200,
            max_size: 1500,
            preserve_tables: true,
        }
    }
}

/// A business-unit keyword, optionally weighted (`- pix` or `- {keyword: pix, weight: 0.5}`).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum KeywordSpec {
    Plain(String),
    Weighted {
        keyword: String,
        #[serde(default = "default_weight")]
        weight: f32,
    },
}

fn default_weight() -> f32 {
    1.0
}

impl KeywordSpec {
    pub fn keyword(&self) -> &str {
        match self {
            KeywordSpec::Plain(k) => k,
            KeywordSpec::Weighted { keyword, .. } => keyword,
        }
    }

    pub fn weight(&self) -> f32 {
        match self {
            KeywordSpec::Plain(_) => 1.0,
            KeywordSpec::Weighted { weight, .. } => *weight,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusinessUnitConfig {
    pub min_score: f32,
    pub max_tags: usize,
    #[serde(deserialize_with = "ordered_map")]
    pub business_unit_keywords: Vec<(String, Vec<KeywordSpec>)>,
}

impl Default for BusinessUnitConfig {
    fn default() -> Self {
        let mut pagbank = plain(&["pagbank", "pagseguro", "pix"]);
        pagbank.push(KeywordSpec::Weighted {
            keyword: "maquininha".to_string(),
            weight: 1.5,
        });
        Self {
            min_score: 1.0,
            max_tags: 10,
            business_unit_keywords: vec![
                ("pagbank".to_string(), pagbank),
                ("financeiro".to_string(), plain(&["financeiro", "contabilidade", "tesouraria", "faturamento", "orçamento"])),
                ("juridico".to_string(), plain(&["jurídico", "advogado", "processo judicial", "compliance", "lgpd"])),
                ("rh".to_string(), plain(&["recursos humanos", "folha de pagamento", "férias", "admissão", "benefícios"])),
                ("tecnologia".to_string(), plain(&["sistema", "servidor", "deploy", "infraestrutura", "software"])),
                ("comercial".to_string(), plain(&["vendas", "proposta comercial", "negociação", "cliente"])),
            ],
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn plain(list: &[&str]) -> Vec<KeywordSpec> {
    list.iter().map(|w| KeywordSpec::Plain(w.to_string())).collect()
}

/// Deserialize a YAML mapping into a Vec, keeping declaration order.
fn ordered_map<'de, D, K, V>(deserializer: D) -> std::result::Result<Vec<(K, V)>, D::Error>
where
    D: Deserializer<'de>,
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    struct OrderedVisitor<K, V>(PhantomData<(K, V)>);

    impl<'de, K, V> Visitor<'de> for OrderedVisitor<K, V>
    where
        K: Deserialize<'de>,
        V: Deserialize<'de>,
    {
        type Value = Vec<(K, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a mapping")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, value)) = map.next_entry()? {
                entries.push((key, value));
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor(PhantomData))
}

impl ProcessingConfig {
    /// Load and validate following the precedence chain.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let config = match resolve_config_path(override_path)? {
            Some(path) => {
                log::info!("Loading processing config from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                log::info!("No processing config file found, using built-in defaults");
                Self::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML file without validating it.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KbenrichError::Config(format!("Failed to read processing config {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
            .map_err(|e| KbenrichError::Config(format!("{} ({})", e, path.display())))
    }

    /// Parse YAML text. An empty document yields the defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml_ng::from_str(content)
            .map_err(|e| KbenrichError::Config(format!("Failed to parse processing config: {}", e)))
    }

    /// Reject rules that would make processing run under wrong assumptions.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.max_size == 0 {
            return Err(KbenrichError::Config("chunking.max_size must be greater than 0".to_string()));
        }
        if chunking.min_size > chunking.max_size {
            return Err(KbenrichError::Config(format!(
                "chunking.min_size ({}) must not exceed chunking.max_size ({})",
                chunking.min_size, chunking.max_size
            )));
        }

        if !self.type_detection.min_score.is_finite() || self.type_detection.min_score < 0.0 {
            return Err(KbenrichError::Config("type_detection.min_score must be a non-negative number".to_string()));
        }
        // Compiling is the only reliable check for pattern syntax.
        crate::processing::type_detector::compile_rules(&self.type_detection)?;

        let bu = &self.business_unit_detection;
        if !bu.min_score.is_finite() || bu.min_score < 0.0 {
            return Err(KbenrichError::Config(
                "business_unit_detection.min_score must be a non-negative number".to_string(),
            ));
        }
        for (unit, keywords) in &bu.business_unit_keywords {
            if unit.trim().is_empty() {
                return Err(KbenrichError::Config("business unit names must not be empty".to_string()));
            }
            for keyword in keywords {
                if keyword.keyword().trim().is_empty() {
                    return Err(KbenrichError::Config(format!("business unit '{}' has an empty keyword", unit)));
                }
                if !keyword.weight().is_finite() || keyword.weight() <= 0.0 {
                    return Err(KbenrichError::Config(format!(
                        "business unit '{}' keyword '{}' must have a positive weight",
                        unit,
                        keyword.keyword()
                    )));
                }
            }
        }

        for custom in &self.entity_extraction.custom_entities {
            if custom.name.trim().is_empty() {
                return Err(KbenrichError::Config("custom entity names must not be empty".to_string()));
            }
            if custom.patterns.is_empty() && custom.regex.is_none() {
                return Err(KbenrichError::Config(format!(
                    "custom entity '{}' needs at least one pattern or a regex",
                    custom.name
                )));
            }
        }

        Ok(())
    }
}

fn resolve_config_path(override_path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Ok(value) = std::env::var(ENV_PROCESSING_CONFIG) {
        if !value.trim().is_empty() {
            let path = PathBuf::from(value);
            if !path.is_file() {
                return Err(KbenrichError::Config(format!(
                    "{} points to a missing file: {}",
                    ENV_PROCESSING_CONFIG,
                    path.display()
                )));
            }
            return Ok(Some(path));
        }
    }

    if let Some(path) = override_path {
        if !path.is_file() {
            return Err(KbenrichError::Config(format!(
                "processing_config_path points to a missing file: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }

    let default_path = PathBuf::from(DEFAULT_PROCESSING_CONFIG_PATH);
    if default_path.is_file() {
        return Ok(Some(default_path));
    }

    Ok(None)
}

/// Serialize tests that mutate the process-wide environment.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = ProcessingConfig::default();
        config.validate().unwrap();
        assert!(config.processing.enabled);
        assert_eq!(config.type_detection.declared_types()[0], DocumentType::Invoice);
        assert_eq!(config.business_unit_detection.business_unit_keywords[0].0, "pagbank");
    }

    #[test]
    fn test_partial_yaml_keeps_section_defaults() {
        let yaml = r#"
processing:
  enabled: false
chunking:
  max_size: 800
"#;
        let config = ProcessingConfig::from_yaml_str(yaml).unwrap();
        assert!(!config.processing.enabled);
        assert_eq!(config.chunking.max_size, 800);
        assert_eq!(config.chunking.min_size, 200);
        assert!(config.chunking.preserve_tables);
        assert!(!config.type_detection.content_keywords.is_empty());
    }

    #[test]
    fn test_ordered_maps_keep_declaration_order() {
        let yaml = r#"
type_detection:
  filename_patterns:
    report: ["relatorio"]
    invoice: ["fatura"]
  content_keywords:
    email: ["assunto:"]
business_unit_detection:
  business_unit_keywords:
    zeta: [z]
    alpha:
      - a
      - keyword: b
        weight: 2.5
"#;
        let config = ProcessingConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(
            config.type_detection.declared_types(),
            vec![DocumentType::Report, DocumentType::Invoice, DocumentType::Email]
        );
        let units = &config.business_unit_detection.business_unit_keywords;
        assert_eq!(units[0].0, "zeta");
        assert_eq!(units[1].0, "alpha");
        assert_eq!(units[1].1[1].keyword(), "b");
        assert_eq!(units[1].1[1].weight(), 2.5);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let config = ProcessingConfig::from_yaml_str("  \n").unwrap();
        assert!(config.processing.enabled);
    }

    #[test]
    fn test_invalid_yaml_is_config_error() {
        let err = ProcessingConfig::from_yaml_str("chunking: [unclosed").unwrap_err();
        assert!(matches!(err, KbenrichError::Config(_)));
    }

    #[test]
    fn test_unknown_document_type_rejected() {
        let yaml = "type_detection:\n  filename_patterns:\n    memo: [\"x\"]\n";
        assert!(ProcessingConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_filename_pattern() {
        let yaml = "type_detection:\n  filename_patterns:\n    invoice: [\"fatura(\"]\n";
        let config = ProcessingConfig::from_yaml_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("fatura("));
    }

    #[test]
    fn test_validate_rejects_inverted_chunk_bounds() {
        let mut config = ProcessingConfig::default();
        config.chunking.min_size = 2000;
        config.chunking.max_size = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_weight() {
        let mut config = ProcessingConfig::default();
        config.business_unit_detection.business_unit_keywords = vec![(
            "unit".to_string(),
            vec![KeywordSpec::Weighted { keyword: "x".to_string(), weight: 0.0 }],
        )];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_malformed_custom_regex() {
        let yaml = r#"
entity_extraction:
  custom_entities:
    - name: contract_id
      regex: "CT-(\\d+"
"#;
        let config = ProcessingConfig::from_yaml_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.entity_extraction.custom_entities.len(), 1);
    }

    #[test]
    fn test_validate_rejects_empty_custom_entity() {
        let yaml = "entity_extraction:\n  custom_entities:\n    - name: nothing\n";
        let config = ProcessingConfig::from_yaml_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_precedence_env_then_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let env_path = temp_dir.path().join("env.yaml");
        let override_path = temp_dir.path().join("override.yaml");
        fs::write(&env_path, "chunking:\n  max_size: 111\n  min_size: 10\n").unwrap();
        fs::write(&override_path, "chunking:\n  max_size: 222\n  min_size: 10\n").unwrap();

        std::env::set_var(ENV_PROCESSING_CONFIG, &env_path);
        let config = ProcessingConfig::load(Some(&override_path)).unwrap();
        assert_eq!(config.chunking.max_size, 111);

        std::env::remove_var(ENV_PROCESSING_CONFIG);
        let config = ProcessingConfig::load(Some(&override_path)).unwrap();
        assert_eq!(config.chunking.max_size, 222);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let _lock = ENV_LOCK.lock().unwrap();
        std::env::set_var(ENV_PROCESSING_CONFIG, "/nonexistent/processing.yaml");
        let result = ProcessingConfig::load(None);
        std::env::remove_var(ENV_PROCESSING_CONFIG);
        assert!(matches!(result, Err(KbenrichError::Config(_))));

        let result = ProcessingConfig::load(Some(Path::new("/nonexistent/override.yaml")));
        assert!(matches!(result, Err(KbenrichError::Config(_))));
    }

    #[test]
    fn test_checked_in_yaml_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_PROCESSING_CONFIG_PATH);
        let config = ProcessingConfig::from_file(&path).unwrap();
        config.validate().unwrap();

        let defaults = ProcessingConfig::default();
        assert_eq!(config.type_detection.declared_types(), defaults.type_detection.declared_types());
        assert_eq!(
            config.business_unit_detection.business_unit_keywords,
            defaults.business_unit_detection.business_unit_keywords
        );
        assert_eq!(config.entity_extraction.custom_entities.len(), 2);
    }
}
