use std::path::{Path, PathBuf};

use serde_json::{json, Map};
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{KbenrichError, Result};
use crate::processing::types::DocumentInput;

/// Extensions picked up by [`discover_documents`] (case-insensitive).
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["md", "txt", "csv", "tsv", "html", "json"];

/// A text document found on disk
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub extension: String,
    pub file_size: u64,
}

impl DiscoveredFile {
    /// Stable document id derived from the relative path.
    pub fn document_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.relative_path.replace('\\', "/").as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Read the file into a submission for the pipeline.
    pub fn to_input(&self) -> Result<DocumentInput> {
        let content = std::fs::read_to_string(&self.absolute_path)?;
        let name = self
            .absolute_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.relative_path.clone());

        let mut metadata = Map::new();
        metadata.insert("extension".to_string(), json!(self.extension));
        metadata.insert("file_size".to_string(), json!(self.file_size));

        Ok(DocumentInput {
            id: Some(self.document_id()),
            name: Some(name),
            content: Some(content),
            source_file: Some(self.relative_path.clone()),
            metadata,
        })
    }
}

fn is_supported(path: &Path) -> Option<String> {
    let extension = path.extension().and_then(|s| s.to_str())?.to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&extension.as_str()).then_some(extension)
}

/// Discover text documents under `root`.
///
/// `root` may be a directory, walked recursively, or a single file. Files with
/// other extensions are skipped.
pub fn discover_documents(root: &Path) -> Result<Vec<DiscoveredFile>> {
    if !root.exists() {
        return Err(KbenrichError::InvalidInput(format!("path does not exist: {}", root.display())));
    }

    let base = if root.is_file() {
        root.parent().unwrap_or(root)
    } else {
        root
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(extension) = is_supported(path) else {
            continue;
        };

        let metadata = std::fs::metadata(path)?;
        let relative_path = path
            .strip_prefix(base)
            .map_err(|_| {
                KbenrichError::InvalidInput(format!("Failed to compute relative path for: {}", path.display()))
            })?
            .to_string_lossy()
            .to_string();

        files.push(DiscoveredFile {
            relative_path,
            absolute_path: path.to_path_buf(),
            extension,
            file_size: metadata.len(),
        });
    }

    log::info!("Discovered {} documents in {}", files.len(), root.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_documents() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("financeiro/2025")).unwrap();
        fs::write(root.join("README.md"), "# Base").unwrap();
        fs::write(root.join("notas.txt"), "nota simples").unwrap();
        fs::write(root.join("tabela.CSV"), "a,b\n1,2").unwrap();
        fs::write(root.join("financeiro/2025/fatura.html"), "<p>Fatura</p>").unwrap();
        fs::write(root.join("config.yaml"), "key: value").unwrap();
        fs::write(root.join("logo.png"), b"\x89PNG\r\n\x1a\n").unwrap();

        let files = discover_documents(root).unwrap();

        assert_eq!(files.len(), 4);
        assert!(files.iter().any(|f| f.relative_path.ends_with("fatura.html")));
        assert!(files.iter().any(|f| f.extension == "csv"));
        assert!(!files.iter().any(|f| f.relative_path.contains("config.yaml")));
        assert!(!files.iter().any(|f| f.relative_path.contains("logo.png")));
    }

    #[test]
    fn test_single_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("relatorio.md");
        fs::write(&file, "Relatório mensal").unwrap();

        let files = discover_documents(&file).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "relatorio.md");
    }

    #[test]
    fn test_missing_root_is_invalid_input() {
        let err = discover_documents(Path::new("/nonexistent/kbenrich/docs")).unwrap_err();
        assert!(matches!(err, KbenrichError::InvalidInput(_)));
    }

    #[test]
    fn test_to_input_uses_path_hash_id() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("fatura.txt"), "Fatura R$ 10,00").unwrap();

        let files = discover_documents(temp_dir.path()).unwrap();
        let input = files[0].to_input().unwrap();

        let id = input.id.unwrap();
        assert_eq!(id.len(), 64);
        assert_eq!(id, files[0].document_id());
        assert_eq!(input.name.as_deref(), Some("fatura.txt"));
        assert_eq!(input.content.as_deref(), Some("Fatura R$ 10,00"));
        assert_eq!(input.source_file.as_deref(), Some("fatura.txt"));
        assert_eq!(input.metadata["extension"], "txt");
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(discover_documents(temp_dir.path()).unwrap().is_empty());
    }
}
