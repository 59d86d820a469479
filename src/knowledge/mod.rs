//! Knowledge bases: chunk documents, embed them and retrieve by similarity.

mod chunking;
mod embedder;
mod vector_store;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AgentError, Result};

pub use chunking::TextChunker;
pub use embedder::{Embedder, HashingEmbedder, HuggingFaceEmbedder};
#[cfg(feature = "persistence")]
pub use vector_store::PgVector;
pub use vector_store::{InMemoryVectorStore, VectorStore};

/// A stored chunk. The id is derived from the content so re-loading a
/// document never duplicates rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Value,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>, metadata: Value) -> Self {
        let content = content.into();
        Self {
            id: content_id(&content),
            name: name.into(),
            content,
            metadata,
        }
    }
}

pub fn content_id(content: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, content.as_bytes())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// A named knowledge base over an embedder and a vector store.
pub struct Knowledge {
    name: String,
    description: Option<String>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    chunker: TextChunker,
    max_results: usize,
}

impl Knowledge {
    pub fn new(
        name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            name: name.into(),
            description: None,
            embedder,
            store,
            chunker: TextChunker::default(),
            max_results: 5,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    pub fn with_chunker(mut self, chunker: TextChunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Chunk, embed and store `text`. Returns the number of new chunks;
    /// chunks already present are skipped.
    pub async fn add_text(&self, name: &str, text: &str, metadata: Value) -> Result<usize> {
        let chunks = self.chunker.chunk(text);
        let mut inserted = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            let mut meta = match &metadata {
                Value::Object(map) => map.clone(),
                _ => serde_json::Map::new(),
            };
            meta.insert("name".into(), json!(name));
            meta.insert("chunk".into(), json!(index));

            let document = Document::new(name, chunk.as_str(), Value::Object(meta));
            let embedding = self.embedder.embed(&document.content).await?;
            if self.store.upsert(document, embedding).await? {
                inserted += 1;
            }
        }

        info!(
            knowledge = %self.name,
            document = name,
            chunks = chunks.len(),
            inserted,
            "loaded document"
        );
        Ok(inserted)
    }

    /// Load a UTF-8 text file. `name` defaults to the file stem.
    pub async fn add_content(
        &self,
        path: impl AsRef<Path>,
        name: Option<&str>,
        metadata: Value,
    ) -> Result<usize> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|err| {
            AgentError::Knowledge(format!("failed reading {}: {err}", path.display()))
        })?;
        let name = match name {
            Some(name) => name.to_string(),
            None => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };
        self.add_text(&name, &text, metadata).await
    }

    /// Nearest chunks for `query`, at most `limit` (default `max_results`).
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Result<Vec<ScoredDocument>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let top_k = limit.unwrap_or(self.max_results).max(1);
        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.search(&embedding, top_k).await?;
        debug!(knowledge = %self.name, query, hits = hits.len(), "knowledge search");
        Ok(hits)
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.count().await
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await
    }
}
