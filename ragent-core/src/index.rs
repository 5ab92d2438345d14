//! In-memory vector index with versioned, immutable snapshots.
//!
//! `create_retriever` embeds every chunk and publishes a new
//! [`IndexSnapshot`]; readers that already hold a snapshot keep a consistent
//! view while a rebuild swaps in the next version.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::document::Document;
use crate::embeddings::{Embedder, cosine_similarity};
use crate::error::{EmbeddingError, RagentError, Result};

/// Default number of results per query.
pub const DEFAULT_K: usize = 4;

const COMPONENT: &str = "Vector store";

/// Anything that can answer a query with ranked documents.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>>;
}

/// A single indexed chunk.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub handle: usize,
    pub document: Document,
    pub embedding: Vec<f32>,
}

/// A search hit with its similarity score.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
    pub handle: usize,
}

/// One immutable build of the index.
#[derive(Debug)]
pub struct IndexSnapshot {
    version: u64,
    entries: Vec<IndexEntry>,
    dims: usize,
    default_k: usize,
}

impl IndexSnapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Length of every stored embedding.
    pub fn dimensions(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Top-`k` entries by cosine similarity, ties broken by insertion order.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> Vec<ScoredDocument> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .map(|e| (e.handle, cosine_similarity(query_embedding, &e.embedding)))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(handle, score)| ScoredDocument {
                document: self.entries[handle].document.clone(),
                score,
                handle,
            })
            .collect()
    }
}

/// Embeds chunks and answers nearest-neighbour queries.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    current: RwLock<Option<Arc<IndexSnapshot>>>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            current: RwLock::new(None),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// Build a new index version from `documents` and make it current.
    ///
    /// Embedding happens before the swap, so concurrent readers see either
    /// the previous version or this one.
    pub async fn create_retriever(&self, documents: Vec<Document>, k: usize) -> Result<Retriever> {
        if documents.is_empty() {
            return Err(RagentError::invalid_input(
                "Cannot create vector store with an empty document list.",
            ));
        }

        let texts: Vec<&str> = documents.iter().map(|d| d.content.as_str()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(EmbeddingError::ResponseParse {
                message: format!(
                    "expected {} embeddings, got {}",
                    documents.len(),
                    embeddings.len()
                ),
            }
            .into());
        }
        let dims = embeddings[0].len();
        if let Some(bad) = embeddings.iter().find(|e| e.len() != dims) {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dims,
                actual: bad.len(),
            }
            .into());
        }

        let entries: Vec<IndexEntry> = documents
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(handle, (document, embedding))| IndexEntry {
                handle,
                document,
                embedding,
            })
            .collect();

        let mut current = self.current.write().await;
        let version = current.as_ref().map_or(1, |s| s.version + 1);
        let snapshot = Arc::new(IndexSnapshot {
            version,
            entries,
            dims,
            default_k: k,
        });
        *current = Some(Arc::clone(&snapshot));
        drop(current);

        info!(
            version,
            entries = snapshot.len(),
            dimensions = dims,
            k,
            embedder = self.embedder.provider_name(),
            "Vector index built"
        );
        Ok(Retriever {
            embedder: Arc::clone(&self.embedder),
            snapshot,
        })
    }

    /// A retriever bound to the current version and its default `k`.
    pub async fn get_retriever(&self) -> Result<Retriever> {
        let snapshot = self.snapshot().await?;
        Ok(Retriever {
            embedder: Arc::clone(&self.embedder),
            snapshot,
        })
    }

    /// Top-`k` chunks for `query` from the current version.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Document>> {
        let snapshot = self.snapshot().await?;
        search_snapshot(self.embedder.as_ref(), &snapshot, query, k)
            .await
            .map(|hits| hits.into_iter().map(|h| h.document).collect())
    }

    pub async fn version(&self) -> Option<u64> {
        self.current.read().await.as_ref().map(|s| s.version)
    }

    pub async fn len(&self) -> usize {
        self.current.read().await.as_ref().map_or(0, |s| s.len())
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn snapshot(&self) -> Result<Arc<IndexSnapshot>> {
        self.current
            .read()
            .await
            .clone()
            .ok_or_else(|| RagentError::not_initialized(COMPONENT))
    }
}

async fn search_snapshot(
    embedder: &dyn Embedder,
    snapshot: &IndexSnapshot,
    query: &str,
    k: usize,
) -> Result<Vec<ScoredDocument>> {
    let query_embedding = embedder.embed(query).await?;
    if query_embedding.len() != snapshot.dims {
        return Err(EmbeddingError::DimensionMismatch {
            expected: snapshot.dims,
            actual: query_embedding.len(),
        }
        .into());
    }
    let hits = snapshot.search(&query_embedding, k);
    debug!(
        version = snapshot.version,
        k,
        hits = hits.len(),
        top_score = hits.first().map(|h| h.score),
        "Vector search"
    );
    Ok(hits)
}

/// A read handle pinned to one index version.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    snapshot: Arc<IndexSnapshot>,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("version", &self.snapshot.version)
            .finish_non_exhaustive()
    }
}

impl Retriever {
    pub fn version(&self) -> u64 {
        self.snapshot.version
    }

    pub fn k(&self) -> usize {
        self.snapshot.default_k
    }

    /// Search with an explicit `k`, returning scores.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>> {
        search_snapshot(self.embedder.as_ref(), &self.snapshot, query, k).await
    }
}

#[async_trait]
impl DocumentRetriever for Retriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let hits = self.search(query, self.snapshot.default_k).await?;
        Ok(hits.into_iter().map(|h| h.document).collect())
    }
}
