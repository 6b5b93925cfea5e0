//! Embedding-backed similarity index over past failure traces.
//!
//! The index stores `(vector, metadata, document)` triples and answers
//! nearest-neighbor queries. Both operations are best-effort:
//!
//! | Operation | On failure |
//! |-----------|------------|
//! | [`SimilarityIndex::add`] | `None` (no vector id) |
//! | [`SimilarityIndex::search`] | empty `Vec` |
//!
//! Failures and timeouts are logged with `tracing::warn!` and never reach
//! the caller as errors.
//!
//! # Distance and similarity
//!
//! Stores rank candidates by the configured [`DistanceMetric`]. The metric
//! also owns the conversion from distance back to a reported similarity,
//! so the two cannot drift apart:
//!
//! ```text
//! cosine:  d = 1 - cos(a, b)      s = round(1 - d, 2), clamped to [0, 1]
//! ```
//!
//! Storage backends:
//! - [`SqliteVectorStore`] — `case_vectors` table, brute-force scan in Rust.
//! - [`InMemoryVectorStore`] — `RwLock<Vec<_>>`, for tests and ephemeral use.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingProvider};
use crate::models::SimilarityMatch;

/// Distance function used by the index.
///
/// Unknown names (e.g. `"dot"`) are rejected when the config is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    #[default]
    Cosine,
}

impl DistanceMetric {
    /// Distance between two vectors; smaller is closer.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b) as f64,
        }
    }

    /// Unrounded similarity for a distance under this metric.
    pub fn raw_similarity(&self, distance: f64) -> f64 {
        match self {
            DistanceMetric::Cosine => 1.0 - distance,
        }
    }

    /// Reported similarity: rounded to two decimals and clamped into `[0, 1]`.
    pub fn similarity(&self, distance: f64) -> f64 {
        round2(self.raw_similarity(distance)).clamp(0.0, 1.0)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn unknown_case_name() -> String {
    "Unknown".to_string()
}

/// Metadata stored next to each vector.
///
/// `root_cause` and `solution` are optional so rows written without them
/// still load; they render as `N/A` when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    #[serde(default = "unknown_case_name")]
    pub case_name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

/// One stored entry.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: VectorMetadata,
    pub document: String,
}

/// A candidate returned by [`VectorStore::nearest`].
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub id: String,
    pub distance: f64,
    pub metadata: VectorMetadata,
}

/// Persistence for index entries.
///
/// `nearest` returns at most `limit` neighbors in ascending distance order.
/// Entries whose dimension differs from the query are skipped.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn insert(&self, entry: &VectorEntry) -> Result<()>;

    async fn nearest(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        limit: usize,
    ) -> Result<Vec<Neighbor>>;
}

/// Score `candidates` against `query` and keep the `limit` closest.
fn rank<'a, I>(candidates: I, query: &[f32], metric: DistanceMetric, limit: usize) -> Vec<Neighbor>
where
    I: IntoIterator<Item = (&'a str, &'a [f32], &'a VectorMetadata)>,
{
    let mut scored: Vec<Neighbor> = candidates
        .into_iter()
        .filter(|(_, vector, _)| vector.len() == query.len())
        .map(|(id, vector, metadata)| Neighbor {
            id: id.to_string(),
            distance: metric.distance(query, vector),
            metadata: metadata.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(limit);
    scored
}

// ============ SQLite Store ============

/// [`VectorStore`] over the `case_vectors` table.
pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, entry: &VectorEntry) -> Result<()> {
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        sqlx::query(
            r#"
            INSERT INTO case_vectors (id, embedding, dims, metadata_json, document, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&entry.id)
        .bind(vec_to_blob(&entry.embedding))
        .bind(entry.embedding.len() as i64)
        .bind(metadata_json)
        .bind(&entry.document)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn nearest(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query("SELECT id, embedding, metadata_json FROM case_vectors WHERE dims = ?")
            .bind(query.len() as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut loaded = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let blob: Vec<u8> = row.get("embedding");
            let metadata_json: String = row.get("metadata_json");
            let metadata = match serde_json::from_str::<VectorMetadata>(&metadata_json) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(id = %id, error = %e, "skipping vector with unreadable metadata");
                    continue;
                }
            };
            loaded.push((id, blob_to_vec(&blob), metadata));
        }

        Ok(rank(
            loaded
                .iter()
                .map(|(id, v, m)| (id.as_str(), v.as_slice(), m)),
            query,
            metric,
            limit,
        ))
    }
}

// ============ In-Memory Store ============

/// [`VectorStore`] held entirely in memory.
#[derive(Default)]
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored metadata for `id`, if present.
    pub fn metadata(&self, id: &str) -> Option<VectorMetadata> {
        let entries = self.entries.read().ok()?;
        entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.metadata.clone())
    }

    /// Stored (truncated) document for `id`, if present.
    pub fn document(&self, id: &str) -> Option<String> {
        let entries = self.entries.read().ok()?;
        entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.document.clone())
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, entry: &VectorEntry) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        entries.push(entry.clone());
        Ok(())
    }

    async fn nearest(
        &self,
        query: &[f32],
        metric: DistanceMetric,
        limit: usize,
    ) -> Result<Vec<Neighbor>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("vector store lock poisoned"))?;
        Ok(rank(
            entries
                .iter()
                .map(|e| (e.id.as_str(), e.embedding.as_slice(), &e.metadata)),
            query,
            metric,
            limit,
        ))
    }
}

// ============ Index ============

/// Cut `text` to at most `max_bytes` bytes without splitting a character.
pub fn truncate_document(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub struct SimilarityIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    metric: DistanceMetric,
    document_max_bytes: usize,
    timeout: Duration,
}

impl SimilarityIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        retrieval: &RetrievalConfig,
        embedding: &EmbeddingConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            metric: retrieval.metric,
            document_max_bytes: retrieval.document_max_bytes,
            timeout: Duration::from_secs(embedding.timeout_secs),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        match tokio::time::timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!(
                "embedding timed out after {}s",
                self.timeout.as_secs()
            )),
        }
    }

    /// Embed and store `text`. Returns the new entry's id, or `None` when
    /// embedding or storage fails.
    pub async fn add(&self, text: &str, metadata: VectorMetadata) -> Option<String> {
        match self.try_add(text, metadata).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "failed to index failure trace");
                None
            }
        }
    }

    async fn try_add(&self, text: &str, metadata: VectorMetadata) -> Result<String> {
        let embedding = self.embed(text).await?;
        let entry = VectorEntry {
            id: uuid::Uuid::new_v4().to_string(),
            embedding,
            metadata,
            document: truncate_document(text, self.document_max_bytes).to_string(),
        };
        self.store.insert(&entry).await?;
        tracing::debug!(id = %entry.id, dims = entry.embedding.len(), "indexed failure trace");
        Ok(entry.id)
    }

    /// Up to `limit` precedents with similarity at or above `threshold`,
    /// most similar first. Empty on any failure.
    pub async fn search(&self, text: &str, threshold: f64, limit: usize) -> Vec<SimilarityMatch> {
        if limit == 0 {
            return Vec::new();
        }
        match self.try_search(text, threshold, limit).await {
            Ok(matches) => matches,
            Err(e) => {
                tracing::warn!(error = %e, "similarity search failed");
                Vec::new()
            }
        }
    }

    async fn try_search(
        &self,
        text: &str,
        threshold: f64,
        limit: usize,
    ) -> Result<Vec<SimilarityMatch>> {
        let query = self.embed(text).await?;
        let neighbors = self.store.nearest(&query, self.metric, limit).await?;
        Ok(self.to_matches(neighbors, threshold))
    }

    /// Convert neighbors to matches, dropping any below `threshold` either
    /// before or after rounding.
    fn to_matches(&self, neighbors: Vec<Neighbor>, threshold: f64) -> Vec<SimilarityMatch> {
        let mut matches: Vec<SimilarityMatch> = neighbors
            .into_iter()
            .filter(|n| self.metric.raw_similarity(n.distance) >= threshold)
            .map(|n| SimilarityMatch {
                similarity: self.metric.similarity(n.distance),
                id: n.id,
                case_name: n.metadata.case_name,
                root_cause: n.metadata.root_cause.unwrap_or_else(|| "N/A".to_string()),
                solution: n.metadata.solution.unwrap_or_else(|| "N/A".to_string()),
            })
            .filter(|m| m.similarity >= threshold)
            .collect();

        // Stores already return ascending distance; keep the contract local.
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches
    }
}
