//! Content signatures for change detection.
//!
//! A signature is the SHA-256 of a row's identity, its whitespace-normalized
//! content and its structured fields in key order. Formatting-only edits do
//! not change it.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::kb::record::SourceRow;
use crate::processing::patterns::collapse_whitespace;

/// Separates hashed components so `("ab", "c")` and `("a", "bc")` differ.
const FIELD_SEPARATOR: &[u8] = &[0x1f];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentSignature(String);

impl ContentSignature {
    pub fn compute(key: &str, content: &str, fields: &BTreeMap<String, Value>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update(FIELD_SEPARATOR);
        hasher.update(collapse_whitespace(content).as_bytes());
        for (name, value) in fields {
            hasher.update(FIELD_SEPARATOR);
            hasher.update(name.as_bytes());
            hasher.update(b"=");
            hasher.update(canonical_json(value).as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn of_row(row: &SourceRow) -> Self {
        Self::compute(&row.key, &row.content, &row.fields)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ContentSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialize with sorted object keys and whitespace-normalized strings.
fn canonical_json(value: &Value) -> String {
    match value {
        Value::String(s) => Value::String(collapse_whitespace(s)).to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let sorted: BTreeMap<&String, &Value> = map.iter().collect();
            let parts: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), canonical_json(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_signature_is_lowercase_hex_sha256() {
        let sig = ContentSignature::compute("1", "texto", &BTreeMap::new());
        assert_eq!(sig.as_str().len(), 64);
        assert!(sig.as_str().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_whitespace_only_changes_ignored() {
        let a = ContentSignature::compute("1", "Como  abrir\na conta?", &fields(&[("area", json!("pag  bank"))]));
        let b = ContentSignature::compute("1", "  Como abrir a\tconta? ", &fields(&[("area", json!("pag bank"))]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_content_change_detected() {
        let a = ContentSignature::compute("1", "valor R$ 10,00", &BTreeMap::new());
        let b = ContentSignature::compute("1", "valor R$ 11,00", &BTreeMap::new());
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_and_fields_are_hashed() {
        let base = ContentSignature::compute("1", "x", &BTreeMap::new());
        assert_ne!(base, ContentSignature::compute("2", "x", &BTreeMap::new()));
        assert_ne!(base, ContentSignature::compute("1", "x", &fields(&[("n", json!(1))])));
        assert_ne!(
            ContentSignature::compute("ab", "c", &BTreeMap::new()),
            ContentSignature::compute("a", "bc", &BTreeMap::new())
        );
    }

    #[test]
    fn test_nested_object_key_order_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"b": 1, "a": {"y": 2, "x": "k"}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": {"x": "k", "y": 2}, "b": 1}"#).unwrap();
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_of_row_matches_compute() {
        let row = SourceRow::new("k", "c").with_field("f", "v");
        assert_eq!(
            ContentSignature::of_row(&row),
            ContentSignature::compute("k", "c", &fields(&[("f", json!("v"))]))
        );
    }
}
