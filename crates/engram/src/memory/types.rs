//! Memory types for the Engram system
//!
//! Defines core data structures for storing and retrieving per-character
//! memories, including the main MemoryEntry struct and the supporting
//! location/stats types used by the admin surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata attached to a memory: arbitrary JSON object, possibly empty.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A single memory unit owned by one character.
///
/// The id and timestamp are assigned at creation and never change; updates
/// may replace content and metadata only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique identifier for this memory (`mem_` + 12 hex chars)
    pub id: String,
    /// Identifier of the character this memory belongs to
    pub character_id: String,
    /// The actual content of the memory
    pub content: String,
    /// When this memory was created
    pub timestamp: DateTime<Utc>,
    /// Optional metadata for this memory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl MemoryEntry {
    /// Create a new memory with a fresh id and the current timestamp
    pub fn new(character_id: impl Into<String>, content: impl Into<String>, metadata: Option<Metadata>) -> Self {
        Self {
            id: generate_memory_id(),
            character_id: character_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Create a memory with an explicit timestamp (bulk import path)
    pub fn with_timestamp(
        character_id: impl Into<String>,
        content: impl Into<String>,
        metadata: Option<Metadata>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            ..Self::new(character_id, content, metadata)
        }
    }
}

/// Generate a short, globally unique memory id
pub fn generate_memory_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("mem_{}", &uuid[..12])
}

/// Which tier currently owns a memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryLocation {
    /// Bounded in-process FIFO queue
    Recent,
    /// Durable staging buffer awaiting embedding
    Buffer,
    /// Embedded rows in the vector index
    Longterm,
}

impl MemoryLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryLocation::Recent => "recent",
            MemoryLocation::Buffer => "buffer",
            MemoryLocation::Longterm => "longterm",
        }
    }
}

/// A memory entry annotated with the tier it was found in.
///
/// Used for admin listing and export, where knowing the storage location
/// matters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocatedMemory {
    #[serde(flatten)]
    pub entry: MemoryEntry,
    pub location: MemoryLocation,
}

/// A memory returned from similarity search, with its score.
///
/// Scores are in (0, 1]; higher is more similar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub memory: MemoryEntry,
    pub similarity_score: f32,
}

/// Per-character memory counts across all three tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterStats {
    pub character_id: String,
    pub recent_count: usize,
    pub buffer_count: usize,
    pub longterm_count: usize,
    pub total_count: usize,
    pub last_memory_at: Option<DateTime<Utc>>,
}

/// Map a character id onto a name safe for file names and table names.
///
/// Anything outside `[A-Za-z0-9_-]` becomes `_`. The mapping is lossy but
/// deterministic; tier contents are always keyed by the exact id.
pub fn sanitize_character_id(character_id: &str) -> String {
    character_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_id_format() {
        let id = generate_memory_id();
        assert!(id.starts_with("mem_"));
        assert_eq!(id.len(), 16);
        assert!(id[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_memory_ids_are_unique() {
        let a = generate_memory_id();
        let b = generate_memory_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_memory_serialization_roundtrip() {
        let mut metadata = Metadata::new();
        metadata.insert("quest_related".to_string(), serde_json::json!(true));

        let entry = MemoryEntry::new("blacksmith_001", "Player asked about the legendary sword", Some(metadata));

        let json = serde_json::to_string(&entry).expect("Failed to serialize entry");
        let deserialized: MemoryEntry = serde_json::from_str(&json).expect("Failed to deserialize entry");

        assert_eq!(entry.id, deserialized.id);
        assert_eq!(entry.character_id, deserialized.character_id);
        assert_eq!(entry.content, deserialized.content);
        assert_eq!(entry.timestamp, deserialized.timestamp);
        assert_eq!(entry.metadata, deserialized.metadata);
    }

    #[test]
    fn test_empty_metadata_omitted_from_json() {
        let entry = MemoryEntry::new("c", "content", None);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("metadata"));
    }

    #[test]
    fn test_with_timestamp_preserves_supplied_instant() {
        let ts = Utc::now() - chrono::Duration::days(30);
        let entry = MemoryEntry::with_timestamp("c", "old news", None, ts);
        assert_eq!(entry.timestamp, ts);
        assert!(entry.id.starts_with("mem_"));
    }

    #[test]
    fn test_location_serialization() {
        for (location, expected) in [
            (MemoryLocation::Recent, "\"recent\""),
            (MemoryLocation::Buffer, "\"buffer\""),
            (MemoryLocation::Longterm, "\"longterm\""),
        ] {
            assert_eq!(serde_json::to_string(&location).unwrap(), expected);
        }
    }

    #[test]
    fn test_located_memory_flattens_entry() {
        let located = LocatedMemory {
            entry: MemoryEntry::new("c", "content", None),
            location: MemoryLocation::Buffer,
        };
        let value = serde_json::to_value(&located).unwrap();
        assert!(value.get("id").is_some());
        assert_eq!(value["location"], "buffer");
    }

    #[test]
    fn test_sanitize_character_id() {
        assert_eq!(sanitize_character_id("blacksmith_001"), "blacksmith_001");
        assert_eq!(sanitize_character_id("innkeeper-2"), "innkeeper-2");
        assert_eq!(sanitize_character_id("the mayor/of üpper"), "the_mayor_of__pper");
    }
}
