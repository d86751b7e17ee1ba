//! Persistent text -> vector memoisation scoped to one embedding model.
//!
//! Layout: `<cache_dir>/<namespace dir>/<sha256 of text>.f32`, each file
//! holding the raw little-endian `f32` values. Entries are only ever
//! added; an existing valid entry is never rewritten.

use std::collections::{HashMap, HashSet};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::sync::Mutex;

use crate::core::errors::RagError;
use crate::core::lock::StoreLock;
use crate::llm::LlmService;

const ENTRY_EXTENSION: &str = "f32";

/// A vector tagged with the model namespace and content fingerprint it
/// was produced for.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector {
    pub namespace: String,
    pub fingerprint: String,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
}

pub struct EmbeddingCache {
    root: PathBuf,
    llm: LlmService,
    compute_lock: Mutex<()>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

/// Content fingerprint used as the cache key.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

impl EmbeddingCache {
    /// Opens the cache for `llm`'s embedding model below `cache_dir`.
    pub fn new(cache_dir: &Path, llm: LlmService) -> Self {
        let root = cache_dir.join(namespace_dir(llm.namespace()));
        Self {
            root,
            llm,
            compute_lock: Mutex::new(()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    pub fn namespace(&self) -> &str {
        self.llm.namespace()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub async fn get_or_compute(&self, text: &str) -> Result<EmbeddingVector, RagError> {
        let mut vectors = self.get_or_compute_batch(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    /// Returns one vector per text, embedding every distinct uncached text
    /// in a single batched collaborator call.
    pub async fn get_or_compute_batch(
        &self,
        texts: &[String],
    ) -> Result<Vec<EmbeddingVector>, RagError> {
        let fingerprints: Vec<String> = texts.iter().map(|text| fingerprint(text)).collect();

        let mut found: HashMap<String, Vec<f32>> = HashMap::new();
        for fp in &fingerprints {
            if found.contains_key(fp) {
                continue;
            }
            if let Some(values) = self.read_entry(fp).await? {
                found.insert(fp.clone(), values);
            }
        }

        self.hits.fetch_add(found.len(), Ordering::Relaxed);

        let pending = missing(texts, &fingerprints, &found);
        if !pending.is_empty() {
            self.compute_missing(pending, &mut found).await?;
        }

        let unique: HashSet<&String> = fingerprints.iter().collect();
        tracing::debug!(
            "Embedding cache [{}]: {} texts, {} distinct",
            self.namespace(),
            texts.len(),
            unique.len()
        );

        fingerprints
            .into_iter()
            .map(|fp| {
                let values = found.get(&fp).cloned().ok_or_else(|| {
                    RagError::Cache(format!("no vector resolved for fingerprint {}", fp))
                })?;
                Ok(EmbeddingVector {
                    namespace: self.namespace().to_string(),
                    fingerprint: fp,
                    values,
                })
            })
            .collect()
    }

    async fn compute_missing(
        &self,
        pending: Vec<(String, String)>,
        found: &mut HashMap<String, Vec<f32>>,
    ) -> Result<(), RagError> {
        let _guard = self.compute_lock.lock().await;
        let _file_lock = StoreLock::exclusive(&self.root.join(".lock"))
            .await
            .map_err(RagError::cache)?;

        // Another caller may have filled these while we waited.
        let mut still_missing = Vec::new();
        for (fp, text) in pending {
            match self.read_entry(&fp).await? {
                Some(values) => {
                    found.insert(fp, values);
                    self.hits.fetch_add(1, Ordering::Relaxed);
                }
                None => still_missing.push((fp, text)),
            }
        }
        if still_missing.is_empty() {
            return Ok(());
        }

        let inputs: Vec<String> = still_missing.iter().map(|(_, text)| text.clone()).collect();
        let vectors = self.llm.embed_documents(&inputs).await?;

        for ((fp, _), values) in still_missing.into_iter().zip(vectors) {
            self.write_entry(&fp, &values).await?;
            found.insert(fp, values);
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    fn entry_path(&self, fp: &str) -> PathBuf {
        self.root.join(format!("{}.{}", fp, ENTRY_EXTENSION))
    }

    async fn read_entry(&self, fp: &str) -> Result<Option<Vec<f32>>, RagError> {
        let path = self.entry_path(fp);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(RagError::Cache(format!(
                    "failed to read {}: {}",
                    path.display(),
                    err
                )))
            }
        };

        match decode_vector(&bytes) {
            Some(values) => Ok(Some(values)),
            None => {
                tracing::warn!(
                    "Ignoring unreadable cache entry {} ({} bytes)",
                    path.display(),
                    bytes.len()
                );
                Ok(None)
            }
        }
    }

    async fn write_entry(&self, fp: &str, values: &[f32]) -> Result<(), RagError> {
        let root = self.root.clone();
        let path = self.entry_path(fp);
        let bytes = encode_vector(values);

        tokio::task::spawn_blocking(move || -> Result<(), RagError> {
            std::fs::create_dir_all(&root).map_err(RagError::cache)?;
            let mut tmp = NamedTempFile::new_in(&root).map_err(RagError::cache)?;
            tmp.write_all(&bytes).map_err(RagError::cache)?;
            tmp.as_file().sync_all().map_err(RagError::cache)?;
            tmp.persist(&path).map_err(|err| RagError::cache(err.error))?;
            Ok(())
        })
        .await
        .map_err(RagError::cache)?
    }
}

/// Distinct (fingerprint, text) pairs not yet resolved, in first-seen order.
fn missing(
    texts: &[String],
    fingerprints: &[String],
    found: &HashMap<String, Vec<f32>>,
) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    fingerprints
        .iter()
        .zip(texts)
        .filter(|(fp, _)| !found.contains_key(*fp) && seen.insert(fp.as_str()))
        .map(|(fp, text)| (fp.clone(), text.clone()))
        .collect()
}

fn namespace_dir(namespace: &str) -> String {
    let safe: String = namespace
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    let digest = hex::encode(Sha256::digest(namespace.as_bytes()));
    format!("{}-{}", safe, &digest[..8])
}

pub(crate) fn encode_vector(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub(crate) fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}
