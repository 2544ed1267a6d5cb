//! Long-term memory tier: durable buffer plus the vector index
//!
//! Evicted memories land in a per-character buffer file and wait there until
//! the buffer crosses its threshold, at which point the whole batch is
//! embedded in one model call and moved into the character's vector
//! collection. The buffer file is the unit of durability: it is truncated
//! only after the index write is confirmed.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex as TokioMutex;

use crate::embedding::EmbeddingEngine;
use crate::error::{EngramError, Result};
use crate::memory::types::{sanitize_character_id, MemoryEntry, Metadata, ScoredMemory};
use crate::storage::LanceStore;

/// Outcome of appending to the buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferOutcome {
    /// Entry appended; threshold not reached
    Appended,
    /// Threshold reached and this many entries were embedded into the index
    Embedded(usize),
}

/// Staging buffer and vector index for one data directory.
///
/// Buffer files live at `<buffer_dir>/<character>.json` as plain JSON arrays
/// of entries; an absent file is an empty buffer.
pub struct LongTermTier {
    store: Arc<TokioMutex<LanceStore>>,
    engine: Arc<EmbeddingEngine>,
    buffer_dir: PathBuf,
    threshold: usize,
}

impl LongTermTier {
    pub fn new(
        store: Arc<TokioMutex<LanceStore>>,
        engine: Arc<EmbeddingEngine>,
        buffer_dir: PathBuf,
        threshold: usize,
    ) -> Result<Self> {
        fs::create_dir_all(&buffer_dir)?;
        Ok(Self {
            store,
            engine,
            buffer_dir,
            threshold: threshold.max(1),
        })
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    fn buffer_path(&self, character_id: &str) -> PathBuf {
        self.buffer_dir
            .join(format!("{}.json", sanitize_character_id(character_id)))
    }

    fn load_buffer(&self, character_id: &str) -> Vec<MemoryEntry> {
        let path = self.buffer_path(character_id);
        if !path.exists() {
            return Vec::new();
        }

        match fs::read_to_string(&path).map_err(EngramError::from).and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| EngramError::Serialization(format!("Corrupt buffer file: {e}")))
        }) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!("Failed to load buffer for {character_id}: {e}");
                Vec::new()
            }
        }
    }

    fn save_buffer(&self, character_id: &str, entries: &[MemoryEntry]) -> Result<()> {
        let path = self.buffer_path(character_id);
        let json = serde_json::to_string_pretty(entries)
            .map_err(|e| EngramError::Serialization(format!("Failed to encode buffer: {e}")))?;
        fs::write(&path, json)
            .map_err(|e| EngramError::Storage(format!("Failed to write buffer {}: {e}", path.display())))
    }

    /// Append an evicted entry to the character's buffer.
    ///
    /// When the buffer reaches the threshold the embed step runs. If the
    /// embedding engine is unavailable the append still succeeds and the
    /// buffer keeps growing past the threshold; the next add or force-embed
    /// retries.
    pub async fn add(&self, entry: MemoryEntry) -> Result<BufferOutcome> {
        let character_id = entry.character_id.clone();

        let mut buffer = self.load_buffer(&character_id);
        buffer.push(entry);
        self.save_buffer(&character_id, &buffer)?;

        tracing::debug!(
            "Buffered memory for {character_id}: {}/{}",
            buffer.len(),
            self.threshold
        );

        if buffer.len() < self.threshold {
            return Ok(BufferOutcome::Appended);
        }

        match self.embed_buffer(&character_id).await {
            Ok(count) => Ok(BufferOutcome::Embedded(count)),
            Err(EngramError::EmbeddingUnavailable(reason)) => {
                tracing::warn!(
                    "Auto-embed deferred for {character_id} (embedding unavailable: {reason})"
                );
                Ok(BufferOutcome::Appended)
            }
            Err(e) => Err(e),
        }
    }

    /// Embed every buffered entry and move the batch into the vector index.
    ///
    /// Runs as a small saga so a crash between steps cannot lose memories:
    /// rows already present in the collection (from a previous attempt that
    /// died before the truncate) are skipped, and the buffer file is
    /// truncated only after the index write succeeds. Returns the number of
    /// entries drained from the buffer.
    pub async fn embed_buffer(&self, character_id: &str) -> Result<usize> {
        let buffer = self.load_buffer(character_id);
        if buffer.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = buffer.iter().map(|e| e.id.clone()).collect();

        let mut store = self.store.lock().await;
        let already_present = store.existing_ids(character_id, &ids).await?;

        let pending: Vec<&MemoryEntry> = buffer
            .iter()
            .filter(|e| !already_present.contains(&e.id))
            .collect();

        if !already_present.is_empty() {
            tracing::info!(
                "Skipping {} already-indexed memories for {character_id} (recovered transfer)",
                already_present.len()
            );
        }

        if !pending.is_empty() {
            let contents: Vec<&str> = pending.iter().map(|e| e.content.as_str()).collect();
            let vectors = self.engine.embed_many(&contents)?;

            let entries: Vec<MemoryEntry> = pending.into_iter().cloned().collect();
            store.add(character_id, &entries, &vectors).await?;
        }
        drop(store);

        self.save_buffer(character_id, &[])?;

        tracing::info!(
            "Embedded {} memories for {character_id} into long-term storage",
            buffer.len()
        );
        Ok(buffer.len())
    }

    /// Current buffer contents, in arrival order
    pub fn buffer_contents(&self, character_id: &str) -> Vec<MemoryEntry> {
        self.load_buffer(character_id)
    }

    pub fn buffer_count(&self, character_id: &str) -> usize {
        self.load_buffer(character_id).len()
    }

    /// Character ids with a non-empty buffer file
    pub fn buffer_character_ids(&self) -> Vec<String> {
        let Ok(dir) = fs::read_dir(&self.buffer_dir) else {
            return Vec::new();
        };

        dir.filter_map(|entry| {
            let path = entry.ok()?.path();
            if path.extension()? != "json" {
                return None;
            }
            let character_id = path.file_stem()?.to_str()?.to_string();
            if self.load_buffer(&character_id).is_empty() {
                None
            } else {
                Some(character_id)
            }
        })
        .collect()
    }

    /// Update a buffered entry in place, preserving id and timestamp
    pub fn update_buffered(
        &self,
        character_id: &str,
        memory_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<bool> {
        let mut buffer = self.load_buffer(character_id);
        let Some(entry) = buffer.iter_mut().find(|e| e.id == memory_id) else {
            return Ok(false);
        };

        entry.content = content.to_string();
        if let Some(metadata) = metadata {
            entry.metadata = Some(metadata);
        }

        self.save_buffer(character_id, &buffer)?;
        Ok(true)
    }

    /// Remove a buffered entry by id
    pub fn delete_buffered(&self, character_id: &str, memory_id: &str) -> Result<bool> {
        let mut buffer = self.load_buffer(character_id);
        let before = buffer.len();
        buffer.retain(|e| e.id != memory_id);

        if buffer.len() == before {
            return Ok(false);
        }

        self.save_buffer(character_id, &buffer)?;
        Ok(true)
    }

    /// Semantic search over a character's embedded memories.
    ///
    /// Distances become similarity scores via `1 / (1 + d)`; equal scores
    /// are broken by the later timestamp. Returns empty when the character
    /// has no collection yet.
    pub async fn search(&self, character_id: &str, query: &str, k: usize) -> Result<Vec<ScoredMemory>> {
        let query_vector = self.engine.embed_one(query)?;

        let mut store = self.store.lock().await;
        let hits = store.query(character_id, &query_vector, k).await?;
        drop(store);

        let mut scored: Vec<ScoredMemory> = hits
            .into_iter()
            .map(|(memory, distance)| ScoredMemory {
                similarity_score: 1.0 / (1.0 + distance.max(0.0)),
                memory,
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.memory.timestamp.cmp(&a.memory.timestamp))
        });

        Ok(scored)
    }

    /// All embedded memories for a character
    pub async fn get_all(&self, character_id: &str) -> Result<Vec<MemoryEntry>> {
        self.store.lock().await.get_all(character_id).await
    }

    pub async fn longterm_count(&self, character_id: &str) -> Result<usize> {
        self.store.lock().await.count(character_id).await
    }

    /// Character ids with an existing vector collection
    pub async fn longterm_character_ids(&self) -> Result<Vec<String>> {
        self.store.lock().await.character_ids().await
    }

    /// Update an embedded memory: re-embed the new content and replace the
    /// stored row, preserving id and timestamp
    pub async fn update_longterm(
        &self,
        character_id: &str,
        memory_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<bool> {
        let mut store = self.store.lock().await;
        if store.get(character_id, memory_id).await?.is_none() {
            return Ok(false);
        }

        let vector = self.engine.embed_one(content)?;
        store
            .update(character_id, memory_id, content, metadata, vector)
            .await
    }

    /// Delete an embedded memory by id
    pub async fn delete_longterm(&self, character_id: &str, memory_id: &str) -> Result<bool> {
        self.store.lock().await.delete(character_id, memory_id).await
    }

    /// Remove every trace of a character from this tier.
    ///
    /// Deletes the buffer file (not merely empties it) and drops the vector
    /// collection. Returns (buffered, embedded) counts removed.
    pub async fn clear(&self, character_id: &str) -> Result<(usize, usize)> {
        let buffered = self.buffer_count(character_id);
        let path = self.buffer_path(character_id);
        if path.exists() {
            fs::remove_file(&path).map_err(|e| {
                EngramError::Storage(format!("Failed to remove buffer {}: {e}", path.display()))
            })?;
        }

        let embedded = self.store.lock().await.drop_collection(character_id).await?;

        tracing::info!("Cleared {buffered} buffered + {embedded} embedded memories for {character_id}");
        Ok((buffered, embedded))
    }

    /// Probe the vector store connection; used by health checks
    pub async fn ping_store(&self) -> Result<()> {
        self.store.lock().await.ping().await
    }
}
