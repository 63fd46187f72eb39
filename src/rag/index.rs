//! Vector index with file persistence.
//!
//! Chunk embeddings live in memory as a dense matrix searched by
//! brute-force cosine similarity. The index persists as two artifacts
//! under its directory: `vectors.bin` (the raw f32 little-endian matrix)
//! and `chunks.json` (embedding dimension plus chunk metadata, in row
//! order). A missing or unreadable pair of artifacts means "no index";
//! the caller rebuilds from the next uploaded batch.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::chunker::TextChunk;
use crate::core::errors::ApiError;
use crate::core::fsutil::write_atomic;
use crate::llm::LlmProvider;

const VECTORS_FILE: &str = "vectors.bin";
const CHUNKS_FILE: &str = "chunks.json";

#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    dimension: usize,
    chunks: Vec<TextChunk>,
}

pub struct VectorIndex {
    dir: PathBuf,
    dimension: usize,
    chunks: Vec<TextChunk>,
    embeddings: Vec<Vec<f32>>,
}

/// Result of a similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    /// Cosine similarity to the query (higher = better).
    pub score: f32,
}

impl VectorIndex {
    /// Embed `chunks` and build a fresh index persisted under `dir`.
    ///
    /// Fails with `EmbeddingFailure` if no chunk produced a vector;
    /// nothing is written in that case.
    pub async fn build(
        dir: PathBuf,
        chunks: Vec<TextChunk>,
        provider: &dyn LlmProvider,
    ) -> Result<Self, ApiError> {
        let (chunks, embeddings) = embed_chunks(chunks, provider, None).await?;
        let dimension = embeddings[0].len();

        let index = Self {
            dir,
            dimension,
            chunks,
            embeddings,
        };
        index.save()?;
        Ok(index)
    }

    /// Embed new chunks and append them, then re-persist.
    ///
    /// Duplicate content is tolerated and kept. On `EmbeddingFailure` the
    /// existing entries are left untouched.
    pub async fn add(
        &mut self,
        chunks: Vec<TextChunk>,
        provider: &dyn LlmProvider,
    ) -> Result<(), ApiError> {
        let (chunks, embeddings) = embed_chunks(chunks, provider, Some(self.dimension)).await?;

        self.chunks.extend(chunks);
        self.embeddings.extend(embeddings);
        self.save()
    }

    /// Load a previously persisted index.
    ///
    /// Returns `None` when no index exists at `dir` or when the artifacts
    /// cannot be deserialized; the latter is logged so the caller can
    /// rebuild from scratch without failing.
    pub fn load(dir: &Path) -> Option<Self> {
        let chunks_path = dir.join(CHUNKS_FILE);
        let vectors_path = dir.join(VECTORS_FILE);
        if !chunks_path.exists() || !vectors_path.exists() {
            return None;
        }

        let meta: IndexMeta = match fs::read_to_string(&chunks_path)
            .map_err(|err| err.to_string())
            .and_then(|raw| serde_json::from_str(&raw).map_err(|err| err.to_string()))
        {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(
                    "Failed to load index metadata from {}: {}; treating as absent",
                    chunks_path.display(),
                    err
                );
                return None;
            }
        };

        let bytes = match fs::read(&vectors_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(
                    "Failed to read {}: {}; treating index as absent",
                    vectors_path.display(),
                    err
                );
                return None;
            }
        };

        let row_bytes = meta.dimension * 4;
        if meta.dimension == 0 || bytes.len() != meta.chunks.len() * row_bytes {
            tracing::warn!(
                "Vector file {} does not match metadata ({} bytes for {} chunks of dim {}); treating index as absent",
                vectors_path.display(),
                bytes.len(),
                meta.chunks.len(),
                meta.dimension
            );
            return None;
        }

        let embeddings = bytes
            .chunks_exact(row_bytes)
            .map(deserialize_embedding)
            .collect();

        Some(Self {
            dir: dir.to_path_buf(),
            dimension: meta.dimension,
            chunks: meta.chunks,
            embeddings,
        })
    }

    /// Persist both artifacts, metadata first so a matching vector file
    /// always refers to current chunk order.
    pub fn save(&self) -> Result<(), ApiError> {
        let meta = IndexMeta {
            dimension: self.dimension,
            chunks: self.chunks.clone(),
        };
        let meta_bytes = serde_json::to_vec_pretty(&meta).map_err(ApiError::internal)?;
        write_atomic(&self.dir.join(CHUNKS_FILE), &meta_bytes).map_err(ApiError::internal)?;

        let mut vector_bytes = Vec::with_capacity(self.embeddings.len() * self.dimension * 4);
        for embedding in &self.embeddings {
            vector_bytes.extend(serialize_embedding(embedding));
        }
        write_atomic(&self.dir.join(VECTORS_FILE), &vector_bytes).map_err(ApiError::internal)
    }

    /// Up to `k` chunks ranked by descending cosine similarity to the
    /// query. With a threshold configured, chunks scoring below it are
    /// excluded; an empty result is a valid outcome.
    pub fn retrieve(&self, query: &[f32], k: usize, threshold: Option<f32>) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .chunks
            .iter()
            .zip(self.embeddings.iter())
            .map(|(chunk, embedding)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(query, embedding),
            })
            .filter(|sc| threshold.map_or(true, |t| sc.score >= t))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        scored
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Embed a chunk batch, dropping chunks the provider returned no vector
/// for. Fails with `EmbeddingFailure` when nothing usable remains.
async fn embed_chunks(
    chunks: Vec<TextChunk>,
    provider: &dyn LlmProvider,
    expected_dimension: Option<usize>,
) -> Result<(Vec<TextChunk>, Vec<Vec<f32>>), ApiError> {
    if chunks.is_empty() {
        return Err(ApiError::ChunkingEmpty);
    }

    let inputs: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let vectors = provider.embed(&inputs).await?;

    let mut kept_chunks = Vec::new();
    let mut kept_vectors: Vec<Vec<f32>> = Vec::new();
    let mut dimension = expected_dimension;

    for (chunk, vector) in chunks.into_iter().zip(vectors.into_iter()) {
        if vector.is_empty() {
            tracing::warn!("Empty embedding for chunk from {}; dropping it", chunk.source);
            continue;
        }
        match dimension {
            Some(dim) if vector.len() != dim => {
                tracing::warn!(
                    "Embedding dimension {} does not match index dimension {}; dropping chunk",
                    vector.len(),
                    dim
                );
                continue;
            }
            None => dimension = Some(vector.len()),
            _ => {}
        }
        kept_chunks.push(chunk);
        kept_vectors.push(vector);
    }

    if kept_vectors.is_empty() {
        return Err(ApiError::EmbeddingFailure);
    }

    Ok((kept_chunks, kept_vectors))
}

fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
