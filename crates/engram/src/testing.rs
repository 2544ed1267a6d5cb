//! Test utilities for engram - deterministic mocks and fixtures
//!
//! The real embedding model is ~90MB and loads in seconds; tests use a
//! deterministic hash-based embedder instead so the whole suite runs without
//! model downloads while exercising the exact same code paths.

use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;

use crate::embedding::{Embedder, EmbeddingEngine, EMBEDDING_DIMENSIONS};
use crate::error::{EngramError, Result};
use crate::memory::coordinator::MemoryCoordinator;
use crate::memory::longterm::LongTermTier;
use crate::memory::recent::RecentTier;
use crate::storage::LanceStore;

/// Deterministic embedder for tests.
///
/// Produces 384-dimensional unit vectors seeded by the input text hash, so
/// identical texts embed identically (zero distance) and distinct texts land
/// far apart, which is all the similarity-ranking tests need.
#[derive(Debug, Clone, Default)]
pub struct MockEmbedder;

impl MockEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl Embedder for MockEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        let mut vector: Vec<f32> = (0..EMBEDDING_DIMENSIONS)
            .map(|i| {
                let x = seed
                    .wrapping_mul(i as u64 + 1)
                    .wrapping_add(0x9e3779b97f4a7c15);
                let normalized = (x as f32) / (u64::MAX as f32);
                (normalized * 2.0) - 1.0
            })
            .collect();

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }
}

/// Embedder that always fails; models a missing/unloadable model
#[derive(Debug, Clone, Default)]
pub struct FailingEmbedder;

impl Embedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        "failing-embedder"
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(EngramError::EmbeddingUnavailable(
            "mock model is unavailable".to_string(),
        ))
    }
}

/// Ready engine backed by the deterministic mock
pub fn mock_engine() -> Arc<EmbeddingEngine> {
    Arc::new(EmbeddingEngine::with_embedder(Arc::new(MockEmbedder::new()), 50))
}

/// Ready engine whose every embed call fails
pub fn failing_engine() -> Arc<EmbeddingEngine> {
    Arc::new(EmbeddingEngine::with_embedder(Arc::new(FailingEmbedder), 50))
}

/// Coordinator over an explicit data directory, wired to the mock embedder.
///
/// Tests point this at a fresh temp directory; restart tests call it twice
/// with the same path.
pub async fn coordinator_at(
    data_dir: &std::path::Path,
    recent_capacity: usize,
    buffer_threshold: usize,
) -> MemoryCoordinator {
    let engine = mock_engine();
    let store = LanceStore::connect(&data_dir.join("index"))
        .await
        .expect("Failed to connect test store");

    let snapshot_path = data_dir.join("recent_snapshot.json");
    let mut recent = RecentTier::new(recent_capacity);
    recent.restore_from_disk(&snapshot_path);

    let longterm = LongTermTier::new(
        Arc::new(TokioMutex::new(store)),
        engine.clone(),
        data_dir.join("buffers"),
        buffer_threshold,
    )
    .expect("Failed to create longterm tier");

    MemoryCoordinator::new(recent, longterm, engine, 3, snapshot_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_embedding_is_deterministic() {
        let model = MockEmbedder::new();
        let emb1 = model.embed("hello world").unwrap();
        let emb2 = model.embed("hello world").unwrap();
        assert_eq!(emb1, emb2);
    }

    #[test]
    fn mock_embedding_has_correct_dimensions() {
        let model = MockEmbedder::new();
        assert_eq!(model.embed("test").unwrap().len(), 384);
    }

    #[test]
    fn mock_embedding_is_normalized() {
        let model = MockEmbedder::new();
        let emb = model.embed("test input").unwrap();
        let norm: f32 = emb.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "expected unit vector, got norm {norm}");
    }

    #[test]
    fn mock_embedding_differs_for_different_inputs() {
        let model = MockEmbedder::new();
        assert_ne!(model.embed("hello").unwrap(), model.embed("world").unwrap());
    }
}
