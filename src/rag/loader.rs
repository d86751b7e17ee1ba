//! Document loading and document identity.

use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::core::errors::RagError;

/// Extracts raw text from a source document.
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    async fn load(&self, path: &Path) -> Result<String, RagError>;
}

/// Reads UTF-8 text files (plain text, markdown, ...).
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextLoader;

#[async_trait]
impl DocumentLoader for PlainTextLoader {
    async fn load(&self, path: &Path) -> Result<String, RagError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| RagError::document_load(path, err))?;
        let text = String::from_utf8(bytes)
            .map_err(|err| RagError::document_load(path, format!("not valid UTF-8: {}", err)))?;
        Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
    }
}

/// Identifier recorded on every passage: the file name.
pub fn document_id(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}

/// Storage key of the document's index: file stem plus a hash of the
/// canonical path, so two files with the same name never share an index.
pub fn document_key(path: &Path) -> String {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let digest = hex::encode(Sha256::digest(canonical.to_string_lossy().as_bytes()));

    let stem: String = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_default()
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .take(48)
        .collect();

    if stem.is_empty() {
        digest[..16].to_string()
    } else {
        format!("{}-{}", stem, &digest[..16])
    }
}
