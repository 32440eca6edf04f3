use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit in the knowledge store: a processed chunk or a bulk-loaded row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub id: String,
    /// Logical content id shared by every chunk of one document.
    pub doc_id: String,
    pub source: Option<String>,
    pub content: String,
    pub metadata: Value,
    pub content_hash: Option<String>,
}

/// A row from a bulk source, e.g. one line of a JSONL export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    pub key: String,
    pub content: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl SourceRow {
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Store id of this row within `source`.
    pub fn record_id(&self, source: &str) -> String {
        format!("{}:{}", source, self.key)
    }

    /// The row as written to the store. Fields go into metadata unchanged.
    pub fn to_record(&self, source: &str, content_hash: Option<String>) -> StoreRecord {
        let id = self.record_id(source);
        StoreRecord {
            doc_id: id.clone(),
            id,
            source: Some(source.to_string()),
            content: self.content.clone(),
            metadata: Value::Object(self.fields.clone().into_iter().collect()),
            content_hash,
        }
    }
}

/// Parse JSON lines into rows. Blank lines are ignored; line numbers in
/// errors are 1-based.
pub fn parse_jsonl(text: &str) -> crate::Result<Vec<SourceRow>> {
    let mut rows = Vec::new();
    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row: SourceRow = serde_json::from_str(line).map_err(|e| {
            crate::KbenrichError::InvalidInput(format!("line {}: {}", number + 1, e))
        })?;
        rows.push(row);
    }
    Ok(rows)
}
