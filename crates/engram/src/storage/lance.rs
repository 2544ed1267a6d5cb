//! LanceDB-backed long-term vector index
//!
//! One table per character, named `npc_<id>_longterm`. Each row holds a
//! memory entry plus its embedding; similarity queries run against a single
//! character's table, so characters are fully isolated from each other.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::TimeZone;
use chrono::Utc;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::Table;

use crate::embedding::EMBEDDING_DIMENSIONS;
use crate::error::{EngramError, Result};
use crate::memory::types::{sanitize_character_id, MemoryEntry, Metadata};

const COLLECTION_PREFIX: &str = "npc_";
const COLLECTION_SUFFIX: &str = "_longterm";

/// Deterministic table name for a character's long-term collection
pub fn collection_name(character_id: &str) -> String {
    format!(
        "{COLLECTION_PREFIX}{}{COLLECTION_SUFFIX}",
        sanitize_character_id(character_id)
    )
}

fn character_id_from_collection(table_name: &str) -> Option<String> {
    table_name
        .strip_prefix(COLLECTION_PREFIX)?
        .strip_suffix(COLLECTION_SUFFIX)
        .map(|s| s.to_string())
}

fn escape_sql(value: &str) -> String {
    value.replace('\'', "''")
}

/// Persistent vector store holding one collection per character
pub struct LanceStore {
    connection: Connection,
    tables: HashMap<String, Table>,
}

impl LanceStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| EngramError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        Ok(Self {
            connection,
            tables: HashMap::new(),
        })
    }

    fn collection_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, true),
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    EMBEDDING_DIMENSIONS as i32,
                ),
                false,
            ),
        ]))
    }

    fn empty_batch(schema: Arc<Schema>) -> RecordBatch {
        let empty_strings: Vec<Option<&str>> = vec![];
        let empty_timestamps: Vec<i64> = vec![];
        let empty_embeddings: Vec<Option<Vec<Option<f32>>>> = vec![];

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings.clone())),
                Arc::new(StringArray::from(empty_strings)),
                Arc::new(TimestampMicrosecondArray::from(empty_timestamps).with_timezone("UTC")),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(empty_embeddings, EMBEDDING_DIMENSIONS as i32)),
            ],
        )
        .expect("Schema matches columns")
    }

    /// Open the character's collection, creating it if it does not exist
    async fn open_or_create(&mut self, character_id: &str) -> Result<Table> {
        let name = collection_name(character_id);
        if let Some(table) = self.tables.get(&name) {
            return Ok(table.clone());
        }

        let table = if self.collection_exists(character_id).await? {
            self.connection
                .open_table(&name)
                .execute()
                .await
                .map_err(|e| EngramError::Storage(format!("Failed to open collection {name}: {e}")))?
        } else {
            let schema = Self::collection_schema();
            let batch = Self::empty_batch(schema.clone());
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

            self.connection
                .create_table(&name, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    EngramError::Storage(format!("Failed to create collection {name}: {e}"))
                })?
        };

        self.tables.insert(name, table.clone());
        Ok(table)
    }

    /// Open the character's collection only if it already exists
    async fn open_existing(&mut self, character_id: &str) -> Result<Option<Table>> {
        let name = collection_name(character_id);
        if let Some(table) = self.tables.get(&name) {
            return Ok(Some(table.clone()));
        }
        if !self.collection_exists(character_id).await? {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&name)
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to open collection {name}: {e}")))?;

        self.tables.insert(name, table.clone());
        Ok(Some(table))
    }

    pub async fn collection_exists(&self, character_id: &str) -> Result<bool> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to list collections: {e}")))?;

        Ok(names.contains(&collection_name(character_id)))
    }

    /// Character ids recovered from existing collection names
    pub async fn character_ids(&self) -> Result<Vec<String>> {
        let names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to list collections: {e}")))?;

        Ok(names
            .iter()
            .filter_map(|n| character_id_from_collection(n))
            .collect())
    }

    /// Probe the connection; used by health checks
    pub async fn ping(&self) -> Result<()> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Vector store unreachable: {e}")))?;
        Ok(())
    }

    /// Convert entries and their vectors to an Arrow RecordBatch
    fn entries_to_batch(
        entries: &[MemoryEntry],
        vectors: &[Vec<f32>],
        schema: Arc<Schema>,
    ) -> Result<RecordBatch> {
        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();

        let metadata_json: Vec<Option<String>> = entries
            .iter()
            .map(|e| match &e.metadata {
                Some(m) => serde_json::to_string(m)
                    .map(Some)
                    .map_err(|err| EngramError::Serialization(format!("Bad metadata: {err}"))),
                None => Ok(None),
            })
            .collect::<Result<_>>()?;
        let metadata_refs: Vec<Option<&str>> = metadata_json.iter().map(|m| m.as_deref()).collect();

        let timestamps: Vec<i64> = entries.iter().map(|e| e.timestamp.timestamp_micros()).collect();

        let embeddings: Vec<Option<Vec<Option<f32>>>> = vectors
            .iter()
            .map(|v| Some(v.iter().map(|&x| Some(x)).collect()))
            .collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(TimestampMicrosecondArray::from(timestamps).with_timezone("UTC")),
                Arc::new(FixedSizeListArray::from_iter_primitive::<
                    arrow_array::types::Float32Type,
                    _,
                    _,
                >(embeddings, EMBEDDING_DIMENSIONS as i32)),
            ],
        )
        .map_err(|e| EngramError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    /// Convert one RecordBatch row back to a MemoryEntry
    fn batch_to_entry(character_id: &str, batch: &RecordBatch, row: usize) -> Result<MemoryEntry> {
        let id_array = Self::string_column(batch, "id")?;
        let content_array = Self::string_column(batch, "content")?;
        let metadata_array = Self::string_column(batch, "metadata")?;

        let timestamp_array = batch
            .column_by_name("timestamp")
            .and_then(|c| c.as_any().downcast_ref::<TimestampMicrosecondArray>())
            .ok_or_else(|| EngramError::Storage("Failed to get timestamp column".to_string()))?;

        let timestamp = Utc
            .timestamp_micros(timestamp_array.value(row))
            .single()
            .ok_or_else(|| EngramError::Storage("Failed to parse timestamp".to_string()))?;

        let metadata: Option<Metadata> = if metadata_array.is_null(row) {
            None
        } else {
            let raw = metadata_array.value(row);
            Some(
                serde_json::from_str(raw)
                    .map_err(|e| EngramError::Storage(format!("Corrupt metadata column: {e}")))?,
            )
        };

        Ok(MemoryEntry {
            id: id_array.value(row).to_string(),
            character_id: character_id.to_string(),
            content: content_array.value(row).to_string(),
            timestamp,
            metadata,
        })
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .ok_or_else(|| EngramError::Storage(format!("Failed to get {name} column")))
    }

    fn distance_at(batch: &RecordBatch, row: usize) -> Result<f32> {
        let distances = batch
            .column_by_name("_distance")
            .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| EngramError::Storage("Failed to get _distance column".to_string()))?;
        Ok(distances.value(row))
    }

    /// Bulk insert entries with their vectors into a character's collection.
    ///
    /// Entries and vectors must be the same length and every vector must have
    /// the engine dimension; ids must not collide with existing rows (the
    /// embed step filters duplicates before calling this).
    pub async fn add(
        &mut self,
        character_id: &str,
        entries: &[MemoryEntry],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        if entries.len() != vectors.len() {
            return Err(EngramError::Storage(format!(
                "Entry/vector length mismatch: {} entries, {} vectors",
                entries.len(),
                vectors.len()
            )));
        }
        if entries.is_empty() {
            return Ok(());
        }
        for vector in vectors {
            if vector.len() != EMBEDDING_DIMENSIONS {
                return Err(EngramError::Storage(format!(
                    "Vector has dimension {}, expected {EMBEDDING_DIMENSIONS}",
                    vector.len()
                )));
            }
        }

        let table = self.open_or_create(character_id).await?;
        let schema = Self::collection_schema();
        let batch = Self::entries_to_batch(entries, vectors, schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .add(Box::new(batches))
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to insert memories: {e}")))?;

        Ok(())
    }

    /// Which of the given ids are already present in the collection.
    ///
    /// Makes the buffer-to-index transfer idempotent after a crash between
    /// the index write and the buffer truncate.
    pub async fn existing_ids(
        &mut self,
        character_id: &str,
        ids: &[String],
    ) -> Result<HashSet<String>> {
        let Some(table) = self.open_existing(character_id).await? else {
            return Ok(HashSet::new());
        };
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let quoted: Vec<String> = ids.iter().map(|id| format!("'{}'", escape_sql(id))).collect();
        let filter = format!("id IN ({})", quoted.join(", "));

        let stream = table
            .query()
            .only_if(filter)
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to query existing ids: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to collect query results: {e}")))?;

        let mut present = HashSet::new();
        for batch in &batches {
            let id_array = Self::string_column(batch, "id")?;
            for row in 0..batch.num_rows() {
                present.insert(id_array.value(row).to_string());
            }
        }

        Ok(present)
    }

    /// Top-k nearest entries by vector distance, paired with the raw distance
    pub async fn query(
        &mut self,
        character_id: &str,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(MemoryEntry, f32)>> {
        let Some(table) = self.open_existing(character_id).await? else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let stream = table
            .query()
            .nearest_to(query_vector)
            .map_err(|e| EngramError::Storage(format!("Failed to create vector query: {e}")))?
            .limit(k)
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to execute search: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to collect search results: {e}")))?;

        let mut results = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                let entry = Self::batch_to_entry(character_id, batch, row)?;
                let distance = Self::distance_at(batch, row)?;
                results.push((entry, distance));
            }
        }

        Ok(results)
    }

    /// Get a single entry by id
    pub async fn get(&mut self, character_id: &str, memory_id: &str) -> Result<Option<MemoryEntry>> {
        let Some(table) = self.open_existing(character_id).await? else {
            return Ok(None);
        };

        let stream = table
            .query()
            .only_if(format!("id = '{}'", escape_sql(memory_id)))
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to query memory: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to collect query results: {e}")))?;

        for batch in &batches {
            if batch.num_rows() > 0 {
                return Ok(Some(Self::batch_to_entry(character_id, batch, 0)?));
            }
        }

        Ok(None)
    }

    /// All entries in a character's collection
    pub async fn get_all(&mut self, character_id: &str) -> Result<Vec<MemoryEntry>> {
        let Some(table) = self.open_existing(character_id).await? else {
            return Ok(Vec::new());
        };

        let stream = table
            .query()
            .execute()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to scan collection: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to collect scan results: {e}")))?;

        let mut entries = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                entries.push(Self::batch_to_entry(character_id, batch, row)?);
            }
        }

        Ok(entries)
    }

    /// Replace a row's content, metadata, and vector, keeping id and timestamp.
    ///
    /// LanceDB updates are SQL column expressions and cannot carry a
    /// fixed-size vector literal, so the row is deleted and re-inserted. The
    /// caller holds the store lock, so the swap is not observable mid-flight.
    /// Returns false if the id is not present.
    pub async fn update(
        &mut self,
        character_id: &str,
        memory_id: &str,
        content: &str,
        metadata: Option<Metadata>,
        vector: Vec<f32>,
    ) -> Result<bool> {
        let Some(existing) = self.get(character_id, memory_id).await? else {
            return Ok(false);
        };

        let updated = MemoryEntry {
            content: content.to_string(),
            metadata: metadata.or(existing.metadata),
            ..existing
        };

        let table = self.open_or_create(character_id).await?;
        table
            .delete(&format!("id = '{}'", escape_sql(memory_id)))
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to replace memory: {e}")))?;

        self.add(character_id, &[updated], &[vector]).await?;
        Ok(true)
    }

    /// Delete a single entry; returns false if the id is not present
    pub async fn delete(&mut self, character_id: &str, memory_id: &str) -> Result<bool> {
        let Some(table) = self.open_existing(character_id).await? else {
            return Ok(false);
        };

        let exists = self.get(character_id, memory_id).await?.is_some();
        if exists {
            table
                .delete(&format!("id = '{}'", escape_sql(memory_id)))
                .await
                .map_err(|e| EngramError::Storage(format!("Failed to delete memory: {e}")))?;
        }

        Ok(exists)
    }

    /// Number of rows in a character's collection
    pub async fn count(&mut self, character_id: &str) -> Result<usize> {
        let Some(table) = self.open_existing(character_id).await? else {
            return Ok(0);
        };

        table
            .count_rows(None)
            .await
            .map_err(|e| EngramError::Storage(format!("Failed to count memories: {e}")))
    }

    /// Drop a character's collection entirely; returns the number of rows removed
    pub async fn drop_collection(&mut self, character_id: &str) -> Result<usize> {
        let count = self.count(character_id).await?;
        let name = collection_name(character_id);

        if self.collection_exists(character_id).await? {
            self.connection
                .drop_table(&name)
                .await
                .map_err(|e| EngramError::Storage(format!("Failed to drop collection {name}: {e}")))?;
            tracing::info!("Dropped collection {name} ({count} memories)");
        }
        self.tables.remove(&name);

        Ok(count)
    }
}
