//! On-disk persistence for [`VectorIndex`].
//!
//! Each document gets its own directory under the store root:
//!
//! ```text
//! <root>/<document key>/manifest.json   passages, namespace, content checksum
//! <root>/<document key>/vectors.bin     little-endian f32, entry-major
//! <root>/<document key>.lock            advisory lock
//! ```
//!
//! `vectors.bin` is written before the manifest, so a manifest on disk
//! always refers to a complete vector file.

use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::core::errors::RagError;
use crate::core::lock::StoreLock;
use crate::rag::chunker::Passage;
use crate::rag::embedding_cache::{decode_vector, encode_vector};
use crate::rag::index::VectorIndex;

const FORMAT_VERSION: u32 = 1;
const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_FILE: &str = "vectors.bin";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexManifest {
    format_version: u32,
    document_id: String,
    namespace: String,
    dimension: usize,
    entry_count: usize,
    /// SHA-256 over `vectors.bin` followed by the serialized passages.
    #[serde(default)]
    content_sha256: Option<String>,
    created_at: DateTime<Utc>,
    passages: Vec<Passage>,
}

/// Result of trying to read a persisted index.
#[derive(Debug)]
pub enum IndexLoad {
    Loaded(VectorIndex),
    NotFound,
    /// Present but unusable; the caller should rebuild.
    Corrupt(String),
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
    allow_unverified: bool,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>, allow_unverified: bool) -> Self {
        Self {
            root: root.into(),
            allow_unverified,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn location(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    pub fn lock_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.lock"))
    }

    pub async fn save(&self, key: &str, index: &VectorIndex) -> Result<(), RagError> {
        let _lock = StoreLock::exclusive(&self.lock_path(key))
            .await
            .map_err(RagError::index_store)?;
        self.save_unlocked(key, index).await
    }

    /// Writes without taking the lock; the caller must hold it exclusively.
    pub async fn save_unlocked(&self, key: &str, index: &VectorIndex) -> Result<(), RagError> {
        let dir = self.location(key);

        let mut vectors = Vec::with_capacity(index.len() * index.dimension() * 4);
        for entry in index.entries() {
            vectors.extend_from_slice(&encode_vector(&entry.vector));
        }

        let passages: Vec<Passage> = index.entries().iter().map(|e| e.passage.clone()).collect();
        let checksum = content_digest(&vectors, &passages).map_err(RagError::index_store)?;
        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            document_id: index.document_id().to_string(),
            namespace: index.namespace().to_string(),
            dimension: index.dimension(),
            entry_count: index.len(),
            content_sha256: Some(checksum),
            created_at: Utc::now(),
            passages,
        };
        let manifest_bytes =
            serde_json::to_vec_pretty(&manifest).map_err(RagError::index_store)?;

        tokio::task::spawn_blocking(move || -> Result<(), RagError> {
            std::fs::create_dir_all(&dir).map_err(RagError::index_store)?;
            write_atomic(&dir, VECTORS_FILE, &vectors)?;
            write_atomic(&dir, MANIFEST_FILE, &manifest_bytes)
        })
        .await
        .map_err(RagError::index_store)??;

        tracing::info!(
            "Saved index for {} to {} ({} entries)",
            index.document_id(),
            self.location(key).display(),
            index.len()
        );
        Ok(())
    }

    pub async fn load(&self, key: &str, expected_namespace: &str) -> Result<IndexLoad, RagError> {
        let _lock = StoreLock::shared(&self.lock_path(key))
            .await
            .map_err(RagError::index_store)?;
        self.load_unlocked(key, expected_namespace).await
    }

    /// Reads without taking the lock. A missing manifest is `NotFound`;
    /// anything unreadable or malformed is `Corrupt`.
    pub async fn load_unlocked(
        &self,
        key: &str,
        expected_namespace: &str,
    ) -> Result<IndexLoad, RagError> {
        let dir = self.location(key);
        let manifest_bytes = match tokio::fs::read(dir.join(MANIFEST_FILE)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(IndexLoad::NotFound),
            Err(err) => return Ok(IndexLoad::Corrupt(format!("manifest is unreadable: {err}"))),
        };
        let vectors = match tokio::fs::read(dir.join(VECTORS_FILE)).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(IndexLoad::Corrupt("vector file is missing".to_string()))
            }
            Err(err) => {
                return Ok(IndexLoad::Corrupt(format!("vector file is unreadable: {err}")))
            }
        };

        Ok(match self.decode(&manifest_bytes, &vectors, expected_namespace) {
            Ok(index) => IndexLoad::Loaded(index),
            Err(reason) => {
                tracing::warn!("Stored index at {} is unusable: {}", dir.display(), reason);
                IndexLoad::Corrupt(reason)
            }
        })
    }

    fn decode(
        &self,
        manifest_bytes: &[u8],
        vectors: &[u8],
        expected_namespace: &str,
    ) -> Result<VectorIndex, String> {
        let manifest: IndexManifest = serde_json::from_slice(manifest_bytes)
            .map_err(|err| format!("manifest is not valid: {err}"))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported format version {}",
                manifest.format_version
            ));
        }
        if manifest.namespace != expected_namespace {
            return Err(format!(
                "built with embedding model '{}', expected '{}'",
                manifest.namespace, expected_namespace
            ));
        }
        match &manifest.content_sha256 {
            Some(expected) => {
                let actual = content_digest(vectors, &manifest.passages)
                    .map_err(|err| format!("passages cannot be hashed: {err}"))?;
                if &actual != expected {
                    return Err("content checksum mismatch".to_string());
                }
            }
            None if self.allow_unverified => {
                tracing::warn!("Loading index without a checksum for {}", manifest.document_id);
            }
            None => return Err("manifest has no content checksum".to_string()),
        }
        if manifest.entry_count > 0 && manifest.dimension == 0 {
            return Err(format!(
                "manifest lists {} entries with dimension 0",
                manifest.entry_count
            ));
        }
        if manifest.passages.len() != manifest.entry_count {
            return Err(format!(
                "manifest lists {} passages but {} entries",
                manifest.passages.len(),
                manifest.entry_count
            ));
        }

        let values = if vectors.is_empty() {
            Vec::new()
        } else {
            decode_vector(vectors).ok_or("vector file is truncated")?
        };
        if values.len() != manifest.entry_count * manifest.dimension {
            return Err(format!(
                "vector file holds {} values, expected {}",
                values.len(),
                manifest.entry_count * manifest.dimension
            ));
        }

        let pairs = manifest
            .passages
            .into_iter()
            .zip(values.chunks(manifest.dimension.max(1)))
            .map(|(passage, vector)| (passage, vector.to_vec()))
            .collect();
        let index = VectorIndex::from_pairs(&manifest.document_id, &manifest.namespace, pairs)
            .map_err(|err| err.to_string())?;
        if index.len() != manifest.entry_count {
            return Err(format!(
                "decoded {} entries, manifest lists {}",
                index.len(),
                manifest.entry_count
            ));
        }
        Ok(index)
    }
}

fn content_digest(vectors: &[u8], passages: &[Passage]) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(vectors);
    hasher.update(serde_json::to_vec(passages)?);
    Ok(hex::encode(hasher.finalize()))
}

fn write_atomic(dir: &Path, name: &str, bytes: &[u8]) -> Result<(), RagError> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(RagError::index_store)?;
    tmp.write_all(bytes).map_err(RagError::index_store)?;
    tmp.as_file().sync_all().map_err(RagError::index_store)?;
    tmp.persist(dir.join(name))
        .map_err(|err| RagError::index_store(err.error))?;
    Ok(())
}
