//! Index lifecycle across sessions.
//!
//! Owns the scope -> `VectorIndex` map. Under `IndexScope::Global` every
//! session shares one index; under `IndexScope::PerSession` each session
//! gets its own directory, removed when the session is deleted. Indexes
//! are loaded lazily from disk on first use.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use tokio::sync::Mutex;

use super::chunker::TextChunk;
use super::index::{ScoredChunk, VectorIndex};
use crate::core::config::IndexScope;
use crate::core::errors::ApiError;
use crate::llm::LlmProvider;

const GLOBAL_KEY: &str = "global";

pub struct IndexManager {
    root: PathBuf,
    scope: IndexScope,
    indexes: Mutex<HashMap<String, VectorIndex>>,
}

impl IndexManager {
    pub fn new(root: PathBuf, scope: IndexScope) -> Self {
        Self {
            root,
            scope,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn scope(&self) -> IndexScope {
        self.scope
    }

    fn key_for(&self, session_id: &str) -> String {
        match self.scope {
            IndexScope::Global => GLOBAL_KEY.to_string(),
            IndexScope::PerSession => format!("sessions/{}", session_id),
        }
    }

    fn dir_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    /// Embed and index a chunk batch for the given session's scope,
    /// building a fresh index if none exists yet. Returns the number of
    /// chunks submitted.
    pub async fn ingest(
        &self,
        session_id: &str,
        chunks: Vec<TextChunk>,
        provider: &dyn LlmProvider,
    ) -> Result<usize, ApiError> {
        let key = self.key_for(session_id);
        let count = chunks.len();

        let mut indexes = self.indexes.lock().await;
        self.load_if_absent(&mut indexes, &key);

        match indexes.get_mut(&key) {
            Some(index) => index.add(chunks, provider).await?,
            None => {
                let index = VectorIndex::build(self.dir_for(&key), chunks, provider).await?;
                indexes.insert(key, index);
            }
        }

        Ok(count)
    }

    /// Whether a non-empty index exists for this session's scope.
    pub async fn is_ready(&self, session_id: &str) -> bool {
        let key = self.key_for(session_id);
        let mut indexes = self.indexes.lock().await;
        self.load_if_absent(&mut indexes, &key);
        indexes.get(&key).is_some_and(|index| !index.is_empty())
    }

    /// Similarity search in this session's scope; empty when no index
    /// exists or nothing clears the threshold.
    pub async fn search(
        &self,
        session_id: &str,
        query_embedding: &[f32],
        k: usize,
        threshold: Option<f32>,
    ) -> Vec<ScoredChunk> {
        let key = self.key_for(session_id);
        let mut indexes = self.indexes.lock().await;
        self.load_if_absent(&mut indexes, &key);
        indexes
            .get(&key)
            .map(|index| index.retrieve(query_embedding, k, threshold))
            .unwrap_or_default()
    }

    /// Drop a deleted session's index. A no-op under global scope, where
    /// the index outlives any one session.
    pub async fn remove_session(&self, session_id: &str) {
        if self.scope != IndexScope::PerSession {
            return;
        }

        let key = self.key_for(session_id);
        self.indexes.lock().await.remove(&key);

        let dir = self.dir_for(&key);
        if dir.exists() {
            if let Err(err) = fs::remove_dir_all(&dir) {
                tracing::warn!("Failed to remove index dir {}: {}", dir.display(), err);
            }
        }
    }

    fn load_if_absent(&self, indexes: &mut HashMap<String, VectorIndex>, key: &str) {
        if !indexes.contains_key(key) {
            if let Some(index) = VectorIndex::load(&self.dir_for(key)) {
                indexes.insert(key.to_string(), index);
            }
        }
    }
}
