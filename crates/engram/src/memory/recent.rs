//! Recent memory tier
//!
//! Per-character bounded FIFO queue of the newest memories, held in process
//! for fast reads. A consolidated snapshot of every character's queue is
//! written to one JSON file on shutdown and restored on startup.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::{EngramError, Result};
use crate::memory::types::{MemoryEntry, Metadata};

/// Bounded FIFO queues of recent memories, one per character.
///
/// When a queue is at capacity, adding a new entry evicts the oldest one and
/// returns it to the caller, which is responsible for moving it to the
/// buffer tier.
pub struct RecentTier {
    capacity: usize,
    queues: HashMap<String, VecDeque<MemoryEntry>>,
}

impl RecentTier {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            queues: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry to its character's queue.
    ///
    /// Returns the evicted oldest entry if the queue was already full.
    pub fn add(&mut self, entry: MemoryEntry) -> Option<MemoryEntry> {
        let queue = self
            .queues
            .entry(entry.character_id.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.capacity));

        let evicted = if queue.len() == self.capacity {
            queue.pop_front()
        } else {
            None
        };

        queue.push_back(entry);
        evicted
    }

    /// All recent memories for a character, oldest first
    pub fn get(&self, character_id: &str) -> Vec<MemoryEntry> {
        self.queues
            .get(character_id)
            .map(|q| q.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Update an entry in place, preserving id and timestamp.
    ///
    /// Metadata is replaced only when a new value is supplied. Returns false
    /// if the id is not in this character's queue.
    pub fn update(
        &mut self,
        character_id: &str,
        memory_id: &str,
        content: &str,
        metadata: Option<Metadata>,
    ) -> bool {
        let Some(queue) = self.queues.get_mut(character_id) else {
            return false;
        };

        for entry in queue.iter_mut() {
            if entry.id == memory_id {
                entry.content = content.to_string();
                if let Some(metadata) = metadata {
                    entry.metadata = Some(metadata);
                }
                return true;
            }
        }

        false
    }

    /// Remove an entry by id, preserving the order of the rest
    pub fn delete(&mut self, character_id: &str, memory_id: &str) -> bool {
        let Some(queue) = self.queues.get_mut(character_id) else {
            return false;
        };

        let before = queue.len();
        queue.retain(|e| e.id != memory_id);
        queue.len() < before
    }

    /// Drop a character's queue entirely; returns how many entries it held
    pub fn clear(&mut self, character_id: &str) -> usize {
        self.queues.remove(character_id).map(|q| q.len()).unwrap_or(0)
    }

    pub fn count(&self, character_id: &str) -> usize {
        self.queues.get(character_id).map(|q| q.len()).unwrap_or(0)
    }

    /// Timestamp of the newest entry for a character
    pub fn last_timestamp(&self, character_id: &str) -> Option<DateTime<Utc>> {
        self.queues
            .get(character_id)
            .and_then(|q| q.back())
            .map(|e| e.timestamp)
    }

    /// All character ids with a non-empty queue
    pub fn character_ids(&self) -> Vec<String> {
        self.queues
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Write every character's queue to one JSON file.
    ///
    /// The file is written to a temporary sibling and renamed into place so a
    /// crash mid-write can never leave a half-written snapshot.
    pub fn snapshot_to_disk(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data: HashMap<&String, Vec<&MemoryEntry>> = self
            .queues
            .iter()
            .map(|(id, q)| (id, q.iter().collect()))
            .collect();

        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| EngramError::Serialization(format!("Failed to encode snapshot: {e}")))?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;

        let total: usize = self.queues.values().map(|q| q.len()).sum();
        tracing::info!(
            "Saved {total} recent memories for {} characters to {}",
            self.queues.len(),
            path.display()
        );
        Ok(())
    }

    /// Restore queues from a snapshot file.
    ///
    /// A missing or unreadable file means an empty tier; a character whose
    /// entry list fails to decode is restored as empty. Restore never fails
    /// the startup sequence.
    pub fn restore_from_disk(&mut self, path: &Path) {
        if !path.exists() {
            tracing::info!("No recent snapshot at {}, starting fresh", path.display());
            return;
        }

        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to read snapshot {}: {e}, starting fresh", path.display());
                return;
            }
        };

        let parsed: HashMap<String, serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Snapshot {} is corrupt: {e}, starting fresh", path.display());
                return;
            }
        };

        for (character_id, value) in parsed {
            let entries: Vec<MemoryEntry> = match serde_json::from_value(value) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("Snapshot entries for {character_id} are corrupt: {e}, skipping");
                    continue;
                }
            };

            // Keep only the newest `capacity` entries, matching the bound the
            // queue had when the snapshot was written
            let mut queue: VecDeque<MemoryEntry> = entries.into();
            while queue.len() > self.capacity {
                queue.pop_front();
            }
            if !queue.is_empty() {
                self.queues.insert(character_id, queue);
            }
        }

        let total: usize = self.queues.values().map(|q| q.len()).sum();
        tracing::info!(
            "Restored {total} recent memories for {} characters from {}",
            self.queues.len(),
            path.display()
        );
    }
}
