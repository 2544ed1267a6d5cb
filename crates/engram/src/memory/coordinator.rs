//! Memory coordinator
//!
//! The only component that sees all three tiers. Orchestrates the write
//! path (recent queue, eviction into the buffer, threshold-triggered
//! embedding), the composite read path (recent + semantically relevant), and
//! the admin operations that cross tier boundaries.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as TokioMutex, RwLock};

use crate::embedding::{EmbeddingEngine, EngineStatus};
use crate::error::{EngramError, Result};
use crate::memory::longterm::{BufferOutcome, LongTermTier};
use crate::memory::recent::RecentTier;
use crate::memory::types::{
    CharacterStats, LocatedMemory, MemoryEntry, MemoryLocation, Metadata, ScoredMemory,
};

/// Longest accepted memory content, in characters
const MAX_CONTENT_CHARS: usize = 10_000;

/// Receipt returned by a successful add
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddReceipt {
    pub memory_id: String,
    pub stored_in: MemoryLocation,
    pub evicted_to_buffer: bool,
    pub buffer_auto_embedded: bool,
}

/// Per-tier counts removed by a clear
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearReport {
    pub recent_deleted: usize,
    pub buffer_deleted: usize,
    pub longterm_deleted: usize,
}

/// Recent plus (optionally) semantically relevant memories.
///
/// The two sets are independent and may overlap by id; deduplication is left
/// to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryContext {
    pub recent: Vec<MemoryEntry>,
    pub relevant: Vec<ScoredMemory>,
}

/// One page of a character's memories across all tiers, newest first
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryPage {
    pub character_id: String,
    pub page: usize,
    pub limit: usize,
    pub total_memories: usize,
    pub total_pages: usize,
    pub memories: Vec<LocatedMemory>,
}

/// Self-describing export of every memory a character has
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportBundle {
    pub character_id: String,
    pub exported_at: DateTime<Utc>,
    pub total_memories: usize,
    pub memories: Vec<LocatedMemory>,
}

/// One memory in a bulk import request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportMemory {
    pub character_id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A single failed item in a bulk import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportFailure {
    pub index: usize,
    pub error: String,
}

/// Outcome of a bulk import; failures do not abort the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub failed: Vec<ImportFailure>,
}

/// Component statuses reported by the admin health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub embedding_engine: String,
    pub vector_store: String,
    pub recent_tier: String,
}

/// Orchestrates the recent queue, the staging buffer, and the vector index.
///
/// Reads share the recent tier through a read lock and may run in parallel;
/// writes serialize per character on an on-demand mutex, so writes to
/// distinct characters proceed concurrently while a single character's
/// operations keep their order.
pub struct MemoryCoordinator {
    recent: RwLock<RecentTier>,
    longterm: LongTermTier,
    engine: Arc<EmbeddingEngine>,
    character_locks: TokioMutex<HashMap<String, Arc<TokioMutex<()>>>>,
    default_search_k: usize,
    snapshot_path: PathBuf,
}

impl MemoryCoordinator {
    pub fn new(
        recent: RecentTier,
        longterm: LongTermTier,
        engine: Arc<EmbeddingEngine>,
        default_search_k: usize,
        snapshot_path: PathBuf,
    ) -> Self {
        Self {
            recent: RwLock::new(recent),
            longterm,
            engine,
            character_locks: TokioMutex::new(HashMap::new()),
            default_search_k: default_search_k.max(1),
            snapshot_path,
        }
    }

    async fn character_lock(&self, character_id: &str) -> Arc<TokioMutex<()>> {
        let mut locks = self.character_locks.lock().await;
        locks
            .entry(character_id.to_string())
            .or_insert_with(|| Arc::new(TokioMutex::new(())))
            .clone()
    }

    fn validate_character(character_id: &str) -> Result<()> {
        if character_id.trim().is_empty() {
            return Err(EngramError::Validation(
                "Character id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_content(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(EngramError::EmptyContent);
        }
        if content.chars().count() > MAX_CONTENT_CHARS {
            return Err(EngramError::Validation(format!(
                "Content exceeds {MAX_CONTENT_CHARS} characters"
            )));
        }
        Ok(())
    }

    /// Add a new memory for a character.
    ///
    /// The entry always lands in the recent queue; if that evicts the oldest
    /// entry it moves into the buffer, which in turn may trigger an
    /// auto-embed of the whole batch.
    pub async fn add(
        &self,
        character_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<AddReceipt> {
        self.add_entry(character_id, content, metadata, None).await
    }

    async fn add_entry(
        &self,
        character_id: &str,
        content: &str,
        metadata: Option<Metadata>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<AddReceipt> {
        Self::validate_character(character_id)?;
        Self::validate_content(content)?;

        let lock = self.character_lock(character_id).await;
        let _guard = lock.lock().await;

        let entry = match timestamp {
            Some(ts) => MemoryEntry::with_timestamp(character_id, content, metadata, ts),
            None => MemoryEntry::new(character_id, content, metadata),
        };
        let memory_id = entry.id.clone();

        tracing::debug!("Adding memory {memory_id} for {character_id}");

        let evicted = self.recent.write().await.add(entry);

        let mut receipt = AddReceipt {
            memory_id,
            stored_in: MemoryLocation::Recent,
            evicted_to_buffer: false,
            buffer_auto_embedded: false,
        };

        if let Some(evicted) = evicted {
            tracing::debug!(
                "Memory {} evicted from recent for {character_id}, buffering",
                evicted.id
            );
            receipt.evicted_to_buffer = true;

            if let BufferOutcome::Embedded(count) = self.longterm.add(evicted).await? {
                receipt.buffer_auto_embedded = true;
                tracing::info!("Auto-embed moved {count} memories to long-term for {character_id}");
            }
        }

        Ok(receipt)
    }

    /// Recent memories for a character, oldest first
    pub async fn get_recent(&self, character_id: &str) -> Vec<MemoryEntry> {
        self.recent.read().await.get(character_id)
    }

    /// Semantic search over a character's long-term memories
    pub async fn search(
        &self,
        character_id: &str,
        query: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredMemory>> {
        Self::validate_character(character_id)?;
        if query.trim().is_empty() {
            return Err(EngramError::Validation(
                "Search query must not be empty".to_string(),
            ));
        }

        let k = k.unwrap_or(self.default_search_k);
        self.longterm.search(character_id, query, k).await
    }

    /// Recent memories plus, when a query is given, relevant ones
    pub async fn get_context(
        &self,
        character_id: &str,
        query: Option<&str>,
        k: Option<usize>,
    ) -> Result<MemoryContext> {
        Self::validate_character(character_id)?;

        let recent = self.get_recent(character_id).await;
        let relevant = match query {
            Some(query) if !query.trim().is_empty() => {
                self.search(character_id, query, k).await?
            }
            _ => Vec::new(),
        };

        Ok(MemoryContext { recent, relevant })
    }

    /// Update a memory wherever it lives, returning the tier it was found in.
    ///
    /// Probes recent, then buffer, then long-term; a long-term update
    /// re-embeds the new content.
    pub async fn update(
        &self,
        character_id: &str,
        memory_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> Result<MemoryLocation> {
        Self::validate_character(character_id)?;
        Self::validate_content(content)?;

        let lock = self.character_lock(character_id).await;
        let _guard = lock.lock().await;

        if self
            .recent
            .write()
            .await
            .update(character_id, memory_id, content, metadata.clone())
        {
            return Ok(MemoryLocation::Recent);
        }

        if self
            .longterm
            .update_buffered(character_id, memory_id, content, metadata.clone())?
        {
            return Ok(MemoryLocation::Buffer);
        }

        if self
            .longterm
            .update_longterm(character_id, memory_id, content, metadata)
            .await?
        {
            return Ok(MemoryLocation::Longterm);
        }

        Err(EngramError::NotFound(format!(
            "Memory {memory_id} not found for character {character_id}"
        )))
    }

    /// Delete a memory wherever it lives, returning the tier it was found in
    pub async fn delete(&self, character_id: &str, memory_id: &str) -> Result<MemoryLocation> {
        Self::validate_character(character_id)?;

        let lock = self.character_lock(character_id).await;
        let _guard = lock.lock().await;

        if self.recent.write().await.delete(character_id, memory_id) {
            return Ok(MemoryLocation::Recent);
        }

        if self.longterm.delete_buffered(character_id, memory_id)? {
            return Ok(MemoryLocation::Buffer);
        }

        if self.longterm.delete_longterm(character_id, memory_id).await? {
            return Ok(MemoryLocation::Longterm);
        }

        Err(EngramError::NotFound(format!(
            "Memory {memory_id} not found for character {character_id}"
        )))
    }

    /// Remove every memory a character has, in all three tiers
    pub async fn clear(&self, character_id: &str) -> Result<ClearReport> {
        Self::validate_character(character_id)?;

        let lock = self.character_lock(character_id).await;
        let guard = lock.lock().await;

        tracing::warn!("Clearing ALL memories for character {character_id}");

        let recent_deleted = self.recent.write().await.clear(character_id);
        let (buffer_deleted, longterm_deleted) = self.longterm.clear(character_id).await?;

        drop(guard);
        // The character is gone; its serialization lock goes with it
        self.character_locks.lock().await.remove(character_id);

        Ok(ClearReport {
            recent_deleted,
            buffer_deleted,
            longterm_deleted,
        })
    }

    /// Force an immediate embed of a character's buffer, regardless of size
    pub async fn force_embed(&self, character_id: &str) -> Result<usize> {
        Self::validate_character(character_id)?;

        let lock = self.character_lock(character_id).await;
        let _guard = lock.lock().await;

        self.longterm.embed_buffer(character_id).await
    }

    /// Per-tier counts and last-insert timestamp for one character
    pub async fn stats(&self, character_id: &str) -> Result<CharacterStats> {
        let recent = self.recent.read().await;
        let recent_count = recent.count(character_id);
        let last_memory_at = recent.last_timestamp(character_id);
        drop(recent);

        let buffer_count = self.longterm.buffer_count(character_id);
        let longterm_count = self.longterm.longterm_count(character_id).await?;

        Ok(CharacterStats {
            character_id: character_id.to_string(),
            recent_count,
            buffer_count,
            longterm_count,
            total_count: recent_count + buffer_count + longterm_count,
            last_memory_at,
        })
    }

    /// Stats for every character known to any tier, sorted by id
    pub async fn list_characters(&self) -> Result<Vec<CharacterStats>> {
        let mut ids: BTreeSet<String> = BTreeSet::new();
        ids.extend(self.recent.read().await.character_ids());
        ids.extend(self.longterm.buffer_character_ids());
        ids.extend(self.longterm.longterm_character_ids().await?);

        let mut summaries = Vec::with_capacity(ids.len());
        for id in ids {
            summaries.push(self.stats(&id).await?);
        }
        Ok(summaries)
    }

    /// Every memory a character has, tagged with its tier, newest first
    async fn located_memories(&self, character_id: &str) -> Result<Vec<LocatedMemory>> {
        let mut memories: Vec<LocatedMemory> = Vec::new();

        for entry in self.recent.read().await.get(character_id) {
            memories.push(LocatedMemory {
                entry,
                location: MemoryLocation::Recent,
            });
        }
        for entry in self.longterm.buffer_contents(character_id) {
            memories.push(LocatedMemory {
                entry,
                location: MemoryLocation::Buffer,
            });
        }
        for entry in self.longterm.get_all(character_id).await? {
            memories.push(LocatedMemory {
                entry,
                location: MemoryLocation::Longterm,
            });
        }

        memories.sort_by(|a, b| b.entry.timestamp.cmp(&a.entry.timestamp));
        Ok(memories)
    }

    /// One page of a character's memories across all tiers
    pub async fn paginated(
        &self,
        character_id: &str,
        page: usize,
        limit: usize,
    ) -> Result<MemoryPage> {
        Self::validate_character(character_id)?;
        if page == 0 {
            return Err(EngramError::Validation("Page numbers start at 1".to_string()));
        }
        if limit == 0 || limit > 100 {
            return Err(EngramError::Validation(
                "Limit must be between 1 and 100".to_string(),
            ));
        }

        let all = self.located_memories(character_id).await?;
        let total_memories = all.len();
        let total_pages = total_memories.div_ceil(limit);

        if page > total_pages && total_memories > 0 {
            return Err(EngramError::Validation(format!(
                "Page {page} out of range (total pages: {total_pages})"
            )));
        }

        let start = (page - 1) * limit;
        let memories = all.into_iter().skip(start).take(limit).collect();

        Ok(MemoryPage {
            character_id: character_id.to_string(),
            page,
            limit,
            total_memories,
            total_pages,
            memories,
        })
    }

    /// Export everything a character remembers, with location annotations
    pub async fn export(&self, character_id: &str) -> Result<ExportBundle> {
        Self::validate_character(character_id)?;

        let memories = self.located_memories(character_id).await?;
        Ok(ExportBundle {
            character_id: character_id.to_string(),
            exported_at: Utc::now(),
            total_memories: memories.len(),
            memories,
        })
    }

    /// Bulk import memories.
    ///
    /// Each item is a fresh add (new id, flows through the recent tier and
    /// may trigger evictions and auto-embeds); a supplied timestamp
    /// overrides the generated one. Items fail individually without
    /// aborting the batch.
    pub async fn import(&self, items: Vec<ImportMemory>) -> Result<ImportReport> {
        let mut report = ImportReport {
            imported: 0,
            failed: Vec::new(),
        };

        for (index, item) in items.into_iter().enumerate() {
            match self
                .add_entry(&item.character_id, &item.content, item.metadata, item.timestamp)
                .await
            {
                Ok(_) => report.imported += 1,
                Err(e) => {
                    tracing::warn!("Import item {index} failed: {e}");
                    report.failed.push(ImportFailure {
                        index,
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Import complete: {} succeeded, {} failed",
            report.imported,
            report.failed.len()
        );
        Ok(report)
    }

    /// Write the recent tier snapshot; called on graceful shutdown
    pub async fn snapshot(&self) -> Result<()> {
        self.recent.read().await.snapshot_to_disk(&self.snapshot_path)
    }

    /// Component statuses for the admin health endpoint
    pub async fn health(&self) -> HealthReport {
        let embedding = self.engine.status();
        let vector_store_ok = self.longterm.ping_store().await.is_ok();

        let status = if !vector_store_ok {
            "unhealthy"
        } else if embedding == EngineStatus::Failed {
            "unhealthy"
        } else if embedding == EngineStatus::NotLoaded {
            "degraded"
        } else {
            "healthy"
        };

        HealthReport {
            status: status.to_string(),
            embedding_engine: embedding.as_str().to_string(),
            vector_store: if vector_store_ok { "connected" } else { "error" }.to_string(),
            recent_tier: "operational".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::coordinator_at;

    async fn test_coordinator(
        recent_capacity: usize,
        buffer_threshold: usize,
    ) -> (MemoryCoordinator, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = coordinator_at(dir.path(), recent_capacity, buffer_threshold).await;
        (coordinator, dir)
    }

    #[tokio::test]
    async fn test_add_validates_content() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;

        assert!(matches!(
            coordinator.add("c", "", None).await,
            Err(EngramError::EmptyContent)
        ));
        assert!(matches!(
            coordinator.add("c", "   \n\t ", None).await,
            Err(EngramError::EmptyContent)
        ));
        let oversized = "x".repeat(10_001);
        assert!(matches!(
            coordinator.add("c", &oversized, None).await,
            Err(EngramError::Validation(_))
        ));
        assert!(matches!(
            coordinator.add("  ", "content", None).await,
            Err(EngramError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_add_receipt_fields() {
        let (coordinator, _dir) = test_coordinator(2, 10).await;

        let receipt = coordinator.add("c", "first", None).await.unwrap();
        assert!(receipt.memory_id.starts_with("mem_"));
        assert_eq!(receipt.stored_in, MemoryLocation::Recent);
        assert!(!receipt.evicted_to_buffer);
        assert!(!receipt.buffer_auto_embedded);

        coordinator.add("c", "second", None).await.unwrap();
        let receipt = coordinator.add("c", "third", None).await.unwrap();
        assert!(receipt.evicted_to_buffer);
        assert!(!receipt.buffer_auto_embedded);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;
        assert!(matches!(
            coordinator.search("c", "  ", None).await,
            Err(EngramError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_context_without_query_skips_search() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;
        coordinator.add("c", "a recent thing", None).await.unwrap();

        let context = coordinator.get_context("c", None, None).await.unwrap();
        assert_eq!(context.recent.len(), 1);
        assert!(context.relevant.is_empty());
    }

    #[tokio::test]
    async fn test_update_missing_everywhere_is_not_found() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;
        coordinator.add("c", "something", None).await.unwrap();

        let result = coordinator.update("c", "mem_000000000000", "new", None).await;
        assert!(matches!(result, Err(EngramError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_from_recent() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;
        let receipt = coordinator.add("c", "to delete", None).await.unwrap();

        let location = coordinator.delete("c", &receipt.memory_id).await.unwrap();
        assert_eq!(location, MemoryLocation::Recent);
        assert!(coordinator.get_recent("c").await.is_empty());
    }

    #[tokio::test]
    async fn test_paginated_validates_inputs() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;
        coordinator.add("c", "one", None).await.unwrap();

        assert!(coordinator.paginated("c", 0, 10).await.is_err());
        assert!(coordinator.paginated("c", 1, 0).await.is_err());
        assert!(coordinator.paginated("c", 1, 101).await.is_err());
        assert!(coordinator.paginated("c", 2, 10).await.is_err());

        let page = coordinator.paginated("c", 1, 10).await.unwrap();
        assert_eq!(page.total_memories, 1);
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn test_paginated_empty_character() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;
        let page = coordinator.paginated("nobody", 1, 10).await.unwrap();
        assert_eq!(page.total_memories, 0);
        assert_eq!(page.total_pages, 0);
        assert!(page.memories.is_empty());
    }

    #[tokio::test]
    async fn test_list_characters_covers_all_tiers() {
        let (coordinator, _dir) = test_coordinator(1, 1).await;

        // "recent_only" stays in recent; "embedded" pushes one entry all the
        // way through buffer into long-term
        coordinator.add("recent_only", "a", None).await.unwrap();
        coordinator.add("embedded", "b", None).await.unwrap();
        coordinator.add("embedded", "c", None).await.unwrap();

        let summaries = coordinator.list_characters().await.unwrap();
        let ids: Vec<&str> = summaries.iter().map(|s| s.character_id.as_str()).collect();
        assert_eq!(ids, vec!["embedded", "recent_only"]);

        let embedded = &summaries[0];
        assert_eq!(embedded.recent_count, 1);
        assert_eq!(embedded.buffer_count, 0);
        assert_eq!(embedded.longterm_count, 1);
        assert_eq!(embedded.total_count, 2);
        assert!(embedded.last_memory_at.is_some());
    }

    #[tokio::test]
    async fn test_import_reports_partial_failures() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;

        let items = vec![
            ImportMemory {
                character_id: "c".to_string(),
                content: "valid memory".to_string(),
                metadata: None,
                timestamp: None,
            },
            ImportMemory {
                character_id: "c".to_string(),
                content: "   ".to_string(),
                metadata: None,
                timestamp: None,
            },
        ];

        let report = coordinator.import(items).await.unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].index, 1);
    }

    #[tokio::test]
    async fn test_import_preserves_supplied_timestamp() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;

        let ts = Utc::now() - chrono::Duration::days(7);
        let report = coordinator
            .import(vec![ImportMemory {
                character_id: "c".to_string(),
                content: "an old memory".to_string(),
                metadata: None,
                timestamp: Some(ts),
            }])
            .await
            .unwrap();
        assert_eq!(report.imported, 1);

        let recent = coordinator.get_recent("c").await;
        assert_eq!(recent[0].timestamp, ts);
    }

    #[tokio::test]
    async fn test_health_is_healthy_with_mock_engine() {
        let (coordinator, _dir) = test_coordinator(5, 10).await;
        let health = coordinator.health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.embedding_engine, "ready");
        assert_eq!(health.vector_store, "connected");
        assert_eq!(health.recent_tier, "operational");
    }
}
