//! Vector index seam and the caching search client over it.
//!
//! `VectorIndex` is the narrow contract to the ANN store; `VectorSearchClient`
//! adds the behavior retrieval depends on: embedding/search memoization,
//! lazy collection creation, per-collection loaded-state tracking, and a
//! single retry when the index reports the collection is not loaded.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use llm_client::TextEmbedder;

use crate::cache::{embedding_key, search_key, CacheStats, TtlCache};

const EMBEDDING_CACHE_CAPACITY: usize = 2000;
const SEARCH_CACHE_CAPACITY: usize = 500;
const EMBEDDING_TTL_SECONDS: i64 = 3600;
const SEARCH_TTL_SECONDS: i64 = 300;

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("vector index connection failed: {0}")]
    Connection(String),

    #[error("collection {0} does not exist")]
    MissingCollection(String),

    #[error("collection {0} is not loaded")]
    NotLoaded(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Loaded,
    NotLoaded,
}

/// One stored vector plus the payload retrieval needs back.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub text_id: String,
    pub attraction_id: Option<i64>,
    pub vector: Vec<f32>,
}

/// Deletion selector for sync entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VectorFilter {
    TextId(String),
    AttractionId(i64),
}

/// One ranked hit. `score = 1/(1+distance)` for positive distance, else 1.0,
/// so callers compare on a [0, 1] scale regardless of the index metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text_id: String,
    pub attraction_id: Option<i64>,
    pub distance: f32,
    pub score: f32,
}

impl SearchHit {
    pub fn new(id: String, text_id: String, attraction_id: Option<i64>, distance: f32) -> Self {
        let score = if distance > 0.0 {
            1.0 / (1.0 + distance)
        } else {
            1.0
        };
        Self {
            id,
            text_id,
            attraction_id,
            distance,
            score,
        }
    }
}

/// Narrow contract to the ANN store.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection with the given dimensionality if absent.
    async fn create_or_get(&self, collection: &str, dim: u64) -> Result<(), VectorError>;

    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<(), VectorError>;

    async fn delete(&self, collection: &str, filter: &VectorFilter) -> Result<(), VectorError>;

    async fn search(
        &self,
        collection: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, VectorError>;

    async fn load(&self, collection: &str) -> Result<(), VectorError>;

    async fn load_state(&self, collection: &str) -> Result<LoadState, VectorError>;
}

pub struct VectorSearchClient {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn TextEmbedder>,
    dim: u64,
    embeddings: TtlCache<Vec<f32>>,
    searches: TtlCache<Vec<SearchHit>>,
    /// Collections already created and confirmed loaded this process.
    ensured: Mutex<HashSet<String>>,
}

impl VectorSearchClient {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn TextEmbedder>, dim: u64) -> Self {
        Self::with_caches(
            index,
            embedder,
            dim,
            TtlCache::new(
                EMBEDDING_CACHE_CAPACITY,
                Some(Duration::seconds(EMBEDDING_TTL_SECONDS)),
            ),
            TtlCache::new(
                SEARCH_CACHE_CAPACITY,
                Some(Duration::seconds(SEARCH_TTL_SECONDS)),
            ),
        )
    }

    /// Construct with caller-supplied caches (tests inject a manual clock).
    pub fn with_caches(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn TextEmbedder>,
        dim: u64,
        embeddings: TtlCache<Vec<f32>>,
        searches: TtlCache<Vec<SearchHit>>,
    ) -> Self {
        Self {
            index,
            embedder,
            dim,
            embeddings,
            searches,
            ensured: Mutex::new(HashSet::new()),
        }
    }

    /// Embed one text through the cache.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, VectorError> {
        let key = embedding_key(text);
        if let Some(vector) = self.embeddings.get(&key) {
            return Ok(vector);
        }
        let vector = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| VectorError::Embedding(e.to_string()))?;
        self.embeddings.insert(key, vector.clone());
        Ok(vector)
    }

    /// Embed many texts, sending only the uncached ones in a single batch
    /// call. Output order matches input order.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, VectorError> {
        let mut out: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut pending: Vec<(usize, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            match self.embeddings.get(&embedding_key(text)) {
                Some(vector) => out[i] = Some(vector),
                None => pending.push((i, text.clone())),
            }
        }

        if !pending.is_empty() {
            let batch: Vec<String> = pending.iter().map(|(_, t)| t.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(batch)
                .await
                .map_err(|e| VectorError::Embedding(e.to_string()))?;
            if vectors.len() != pending.len() {
                return Err(VectorError::Embedding(format!(
                    "batch returned {} vectors for {} texts",
                    vectors.len(),
                    pending.len()
                )));
            }
            for ((i, text), vector) in pending.into_iter().zip(vectors) {
                self.embeddings.insert(embedding_key(&text), vector.clone());
                out[i] = Some(vector);
            }
        }

        Ok(out.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    /// Search the collection for a query string. Results are memoized per
    /// (query, collection, top_k); a "not loaded" error triggers one reload
    /// and exactly one retry.
    pub async fn search(
        &self,
        query: &str,
        collection: &str,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, VectorError> {
        let cache_key = search_key(query, collection, top_k);
        if let Some(hits) = self.searches.get(&cache_key) {
            debug!(collection, top_k, "vector search cache hit");
            return Ok(hits);
        }

        self.ensure_collection(collection).await?;
        let vector = self.embed(query).await?;

        let hits = match self.index.search(collection, vector.clone(), top_k).await {
            Ok(hits) => hits,
            Err(VectorError::NotLoaded(name)) => {
                warn!(collection = %name, "collection not loaded, reloading once");
                self.index.load(collection).await?;
                self.index.search(collection, vector, top_k).await?
            }
            Err(e) => return Err(e),
        };

        self.searches.insert(cache_key, hits.clone());
        Ok(hits)
    }

    /// Embed and upsert one knowledge text under its stable `text_id`.
    pub async fn upsert_text(
        &self,
        collection: &str,
        text_id: &str,
        attraction_id: Option<i64>,
        content: &str,
    ) -> Result<(), VectorError> {
        self.ensure_collection(collection).await?;
        let vector = self.embed(content).await?;
        let record = VectorRecord {
            id: uuid::Uuid::new_v4().to_string(),
            text_id: text_id.to_string(),
            attraction_id,
            vector,
        };
        // Replace-by-text_id: drop any previous entry first so re-uploads
        // never accumulate stale vectors.
        self.index
            .delete(collection, &VectorFilter::TextId(text_id.to_string()))
            .await?;
        self.index.upsert(collection, vec![record]).await?;
        info!(collection, text_id, "vector entry upserted");
        Ok(())
    }

    pub async fn delete_entries(
        &self,
        collection: &str,
        filter: &VectorFilter,
    ) -> Result<(), VectorError> {
        self.index.delete(collection, filter).await
    }

    /// Forget which collections were confirmed loaded, forcing a re-check on
    /// the next search. Called after administrative reloads.
    pub fn clear_loaded(&self) {
        self.ensured.lock().unwrap().clear();
        self.searches.clear();
    }

    /// Cache counters for periodic diagnostics.
    pub fn diagnostics(&self) -> VectorDiagnostics {
        VectorDiagnostics {
            embedding_cache: self.embeddings.stats(),
            search_cache: self.searches.stats(),
            embedding_entries: self.embeddings.len(),
            search_entries: self.searches.len(),
        }
    }

    async fn ensure_collection(&self, collection: &str) -> Result<(), VectorError> {
        if self.ensured.lock().unwrap().contains(collection) {
            return Ok(());
        }
        self.index.create_or_get(collection, self.dim).await?;
        if self.index.load_state(collection).await? == LoadState::NotLoaded {
            self.index.load(collection).await?;
        }
        self.ensured.lock().unwrap().insert(collection.to_string());
        Ok(())
    }
}

/// Snapshot of the cache layer for periodic logging.
#[derive(Debug, Clone, Copy)]
pub struct VectorDiagnostics {
    pub embedding_cache: CacheStats,
    pub search_cache: CacheStats,
    pub embedding_entries: usize,
    pub search_entries: usize,
}

/// Degrade a fallible vector call to empty results, recording the failure.
pub fn degrade_to_empty<T: Default>(
    result: Result<T, VectorError>,
    operation: &str,
    errors: &mut HashMap<String, String>,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            warn!(operation, error = %e, "vector operation degraded to empty");
            errors.insert(operation.to_string(), e.to_string());
            T::default()
        }
    }
}
