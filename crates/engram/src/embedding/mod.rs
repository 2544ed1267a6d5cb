//! Embedding generation for semantic memory search
//!
//! Wraps a local sentence-embedding model (all-MiniLM-L6-v2, 384 dimensions)
//! behind a process-wide engine with lazy, init-once loading. The engine is
//! safe for concurrent use; the first embedding call blocks while the model
//! loads unless `warmup` was called at startup.

use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use serde::Deserialize;

use crate::error::{EngramError, Result};

/// Dimension of the vectors produced by the default model
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Trait for generating text embeddings
pub trait Embedder: Send + Sync {
    /// Dimension of embeddings produced by this embedder
    fn dimension(&self) -> usize;

    /// Model name/identifier
    fn model_name(&self) -> &str;

    /// Embed a single text string
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed multiple texts in one model call (more efficient for many texts)
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Compute backend requested for the embedding model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Probe cuda, then metal, then fall back to cpu
    #[default]
    Auto,
    Cpu,
    GpuCuda,
    GpuMetal,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Auto => "auto",
            Backend::Cpu => "cpu",
            Backend::GpuCuda => "gpu-cuda",
            Backend::GpuMetal => "gpu-metal",
        }
    }
}

impl FromStr for Backend {
    type Err = EngramError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto" => Ok(Backend::Auto),
            "cpu" => Ok(Backend::Cpu),
            "gpu-cuda" => Ok(Backend::GpuCuda),
            "gpu-metal" => Ok(Backend::GpuMetal),
            other => Err(EngramError::Config(format!(
                "Unknown embedding backend: {other}. Use auto, cpu, gpu-cuda, or gpu-metal."
            ))),
        }
    }
}

/// Backend actually selected after probing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBackend {
    Cpu,
    Cuda,
    Metal,
}

impl ResolvedBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolvedBackend::Cpu => "cpu",
            ResolvedBackend::Cuda => "cuda",
            ResolvedBackend::Metal => "metal",
        }
    }
}

fn cuda_available() -> bool {
    std::env::var_os("CUDA_PATH").is_some() || std::path::Path::new("/usr/local/cuda").exists()
}

fn metal_available() -> bool {
    cfg!(target_os = "macos")
}

/// Resolve a configured backend to a concrete one, probing cuda then metal
pub fn resolve_backend(backend: Backend) -> ResolvedBackend {
    match backend {
        Backend::Cpu => ResolvedBackend::Cpu,
        Backend::GpuCuda => {
            if cuda_available() {
                ResolvedBackend::Cuda
            } else {
                tracing::warn!("CUDA requested but not detected, falling back to cpu");
                ResolvedBackend::Cpu
            }
        }
        Backend::GpuMetal => {
            if metal_available() {
                ResolvedBackend::Metal
            } else {
                tracing::warn!("Metal requested but not available, falling back to cpu");
                ResolvedBackend::Cpu
            }
        }
        Backend::Auto => {
            if cuda_available() {
                ResolvedBackend::Cuda
            } else if metal_available() {
                ResolvedBackend::Metal
            } else {
                ResolvedBackend::Cpu
            }
        }
    }
}

/// Local embedding model using fastembed (ONNX, no external API)
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model: Mutex<fastembed::TextEmbedding>,
    model_name: String,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    /// Download (first run) and load the default model
    pub fn new(backend: ResolvedBackend) -> Result<Self> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(false);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            EngramError::EmbeddingUnavailable(format!("Failed to initialize embedding model: {e}"))
        })?;

        tracing::info!(
            model = "all-MiniLM-L6-v2",
            dimension = EMBEDDING_DIMENSIONS,
            backend = backend.as_str(),
            "Initialized local embedder"
        );

        Ok(Self {
            model: Mutex::new(model),
            model_name: "all-MiniLM-L6-v2".to_string(),
        })
    }
}

#[cfg(feature = "local-embeddings")]
impl Embedder for LocalEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self.model.lock().map_err(|e| {
            EngramError::EmbeddingUnavailable(format!("Failed to acquire model lock: {e}"))
        })?;

        let embeddings = model.embed(vec![text], None).map_err(|e| {
            EngramError::EmbeddingUnavailable(format!("Failed to generate embedding: {e}"))
        })?;

        embeddings.into_iter().next().ok_or_else(|| {
            EngramError::EmbeddingUnavailable("Model returned no embedding".to_string())
        })
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut model = self.model.lock().map_err(|e| {
            EngramError::EmbeddingUnavailable(format!("Failed to acquire model lock: {e}"))
        })?;

        model.embed(texts.to_vec(), None).map_err(|e| {
            EngramError::EmbeddingUnavailable(format!("Failed to generate embeddings: {e}"))
        })
    }
}

/// Lifecycle status of the process-wide embedding engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    NotLoaded,
    Ready,
    Failed,
}

impl EngineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineStatus::NotLoaded => "not_loaded",
            EngineStatus::Ready => "ready",
            EngineStatus::Failed => "failed",
        }
    }
}

enum EngineState {
    Uninitialized,
    Loading,
    Ready(Arc<dyn Embedder>),
    Failed(String),
}

/// Process-wide embedding engine with init-once lazy loading.
///
/// Holds at most one loaded model. Callers share the engine through an
/// `Arc`; `embed_one` and `embed_many` are safe to call concurrently. A
/// failed load is retried on the next call, so a transient failure (e.g. no
/// network for the first model download) does not wedge the process.
pub struct EmbeddingEngine {
    backend: Backend,
    max_batch: usize,
    state: RwLock<EngineState>,
    load_lock: Mutex<()>,
}

impl EmbeddingEngine {
    pub fn new(backend: Backend, max_batch: usize) -> Self {
        Self {
            backend,
            max_batch: max_batch.max(1),
            state: RwLock::new(EngineState::Uninitialized),
            load_lock: Mutex::new(()),
        }
    }

    /// Build an engine around an already-loaded embedder.
    ///
    /// Used by tests to inject a deterministic model.
    pub fn with_embedder(embedder: Arc<dyn Embedder>, max_batch: usize) -> Self {
        Self {
            backend: Backend::Cpu,
            max_batch: max_batch.max(1),
            state: RwLock::new(EngineState::Ready(embedder)),
            load_lock: Mutex::new(()),
        }
    }

    /// Current lifecycle status
    pub fn status(&self) -> EngineStatus {
        match &*self.state.read().expect("engine state lock poisoned") {
            EngineState::Uninitialized | EngineState::Loading => EngineStatus::NotLoaded,
            EngineState::Ready(_) => EngineStatus::Ready,
            EngineState::Failed(_) => EngineStatus::Failed,
        }
    }

    /// Vector dimension produced by this engine
    pub fn dimension(&self) -> usize {
        match &*self.state.read().expect("engine state lock poisoned") {
            EngineState::Ready(embedder) => embedder.dimension(),
            _ => EMBEDDING_DIMENSIONS,
        }
    }

    /// Force the engine into the ready state; idempotent.
    ///
    /// Runs a test inference so that startup fails loudly rather than on the
    /// first request.
    pub fn warmup(&self) -> Result<()> {
        let embedder = self.ensure_loaded()?;
        let probe = embedder.embed("warmup")?;
        if probe.len() != embedder.dimension() {
            return Err(EngramError::EmbeddingUnavailable(format!(
                "Model produced {}-dimensional vector, expected {}",
                probe.len(),
                embedder.dimension()
            )));
        }
        tracing::info!("Embedding engine warmed up and ready");
        Ok(())
    }

    /// Embed a single text
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = self.ensure_loaded()?;
        embedder.embed(text)
    }

    /// Embed many texts, preserving order and length.
    ///
    /// Inputs are chunked at the configured batch ceiling so an oversized
    /// force-embed cannot hand the model an unbounded batch.
    pub fn embed_many(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embedder = self.ensure_loaded()?;
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.max_batch) {
            all.extend(embedder.embed_batch(chunk)?);
        }

        if all.len() != texts.len() {
            return Err(EngramError::EmbeddingUnavailable(format!(
                "Model returned {} embeddings for {} inputs",
                all.len(),
                texts.len()
            )));
        }

        Ok(all)
    }

    fn ensure_loaded(&self) -> Result<Arc<dyn Embedder>> {
        if let EngineState::Ready(embedder) = &*self.state.read().expect("engine state lock poisoned")
        {
            return Ok(embedder.clone());
        }

        let _guard = self.load_lock.lock().map_err(|e| {
            EngramError::EmbeddingUnavailable(format!("Failed to acquire load lock: {e}"))
        })?;

        // Another caller may have finished loading while we waited
        if let EngineState::Ready(embedder) = &*self.state.read().expect("engine state lock poisoned")
        {
            return Ok(embedder.clone());
        }

        *self.state.write().expect("engine state lock poisoned") = EngineState::Loading;

        match self.build_embedder() {
            Ok(embedder) => {
                *self.state.write().expect("engine state lock poisoned") =
                    EngineState::Ready(embedder.clone());
                Ok(embedder)
            }
            Err(e) => {
                tracing::error!("Failed to load embedding model: {e}");
                *self.state.write().expect("engine state lock poisoned") =
                    EngineState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    #[cfg(feature = "local-embeddings")]
    fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        let resolved = resolve_backend(self.backend);
        tracing::info!(backend = resolved.as_str(), "Loading embedding model");
        Ok(Arc::new(LocalEmbedder::new(resolved)?))
    }

    #[cfg(not(feature = "local-embeddings"))]
    fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        Err(EngramError::EmbeddingUnavailable(
            "Built without the 'local-embeddings' feature; no embedding model available"
                .to_string(),
        ))
    }
}
