//! End-to-end question answering over a single document.

use std::path::Path;
use std::sync::Arc;

use crate::core::config::{validate_config, AppPaths, RagConfig};
use crate::core::errors::RagError;
use crate::core::lock::StoreLock;
use crate::llm::LlmService;
use crate::rag::chunker::Chunker;
use crate::rag::embedding_cache::EmbeddingCache;
use crate::rag::index::VectorIndex;
use crate::rag::loader::{document_id, document_key, DocumentLoader, PlainTextLoader};
use crate::rag::prompt::PromptAssembler;
use crate::rag::retriever::{RetrievalOutcome, Retriever};
use crate::rag::store::{IndexLoad, IndexStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Chat model output, unmodified.
    Generated(String),
    /// Fixed refusal for queries the document does not cover.
    Unrelated(String),
}

impl Answer {
    pub fn text(&self) -> &str {
        match self {
            Answer::Generated(text) | Answer::Unrelated(text) => text,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Answer::Generated(_))
    }
}

pub struct AnswerService {
    llm: LlmService,
    loader: Arc<dyn DocumentLoader>,
    chunker: Chunker,
    cache: EmbeddingCache,
    store: IndexStore,
    retriever: Retriever,
    prompts: PromptAssembler,
}

impl AnswerService {
    pub fn new(config: RagConfig, paths: &AppPaths, llm: LlmService) -> Result<Self, RagError> {
        validate_config(&config)?;

        Ok(Self {
            loader: Arc::new(PlainTextLoader),
            chunker: Chunker::new(config.chunking)?,
            cache: EmbeddingCache::new(&paths.cache_dir, llm.clone()),
            store: IndexStore::new(paths.index_dir.clone(), config.index.allow_unverified),
            retriever: Retriever::new(llm.clone(), config.retrieval),
            prompts: PromptAssembler::new(config.generation),
            llm,
        })
    }

    pub fn with_loader(mut self, loader: Arc<dyn DocumentLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    /// Returns the persisted index for `document`, building and saving it
    /// when none exists or the stored one cannot be used.
    pub async fn prepare_index(&self, document: &Path) -> Result<VectorIndex, RagError> {
        let key = document_key(document);
        let namespace = self.cache.namespace();

        match self.store.load(&key, namespace).await? {
            IndexLoad::Loaded(index) => {
                tracing::debug!("Loaded stored index {} ({} entries)", key, index.len());
                return Ok(index);
            }
            IndexLoad::NotFound => {
                tracing::info!("No stored index for {}, building one", document.display());
            }
            IndexLoad::Corrupt(reason) => {
                tracing::warn!("Rebuilding index for {}: {}", document.display(), reason);
            }
        }

        let _lock = StoreLock::exclusive(&self.store.lock_path(&key))
            .await
            .map_err(RagError::index_store)?;
        // Another process may have finished a build while we waited.
        if let IndexLoad::Loaded(index) = self.store.load_unlocked(&key, namespace).await? {
            return Ok(index);
        }
        self.build_and_save(document, &key).await
    }

    /// Rebuilds the index from the document regardless of what is stored.
    pub async fn rebuild_index(&self, document: &Path) -> Result<VectorIndex, RagError> {
        let key = document_key(document);
        let _lock = StoreLock::exclusive(&self.store.lock_path(&key))
            .await
            .map_err(RagError::index_store)?;
        self.build_and_save(document, &key).await
    }

    async fn build_and_save(&self, document: &Path, key: &str) -> Result<VectorIndex, RagError> {
        let text = self.loader.load(document).await?;
        let id = document_id(document);
        let passages = self.chunker.chunk(&id, &text);
        if passages.is_empty() {
            tracing::warn!("{} produced no passages", document.display());
        }

        let index = VectorIndex::build(&id, passages, &self.cache).await?;
        self.store.save_unlocked(key, &index).await?;
        Ok(index)
    }

    pub async fn retrieve(
        &self,
        document: &Path,
        query: &str,
    ) -> Result<RetrievalOutcome, RagError> {
        let index = self.prepare_index(document).await?;
        self.retriever.retrieve(&index, query).await
    }

    pub async fn answer(&self, document: &Path, query: &str) -> Result<Answer, RagError> {
        match self.retrieve(document, query).await? {
            RetrievalOutcome::Answerable { context, hits } => {
                tracing::info!("Answering from {} passages", hits.len());
                let request = self.prompts.assemble(query, &context);
                let text = self.llm.chat(request).await?;
                Ok(Answer::Generated(text))
            }
            RetrievalOutcome::Unrelated { message, .. } => Ok(Answer::Unrelated(message)),
        }
    }
}
