//! Per-character memory endpoints
//!
//! The game-facing surface: add a memory, read the recent window, search
//! long-term storage, fetch combined context, clear a character.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::EngramError;
use crate::memory::coordinator::ClearReport;
use crate::memory::types::{MemoryEntry, Metadata, ScoredMemory};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct AddMemoryRequest {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Serialize)]
pub struct AddMemoryResponse {
    pub id: String,
    pub stored_in: String,
    pub evicted_to_buffer: bool,
    pub buffer_auto_embedded: bool,
}

#[derive(Debug, Serialize)]
pub struct RecentMemoriesResponse {
    pub memories: Vec<MemoryEntry>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ScoredMemory>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub recent: Vec<MemoryEntry>,
    pub relevant: Vec<ScoredMemory>,
    pub recent_count: usize,
    pub relevant_count: usize,
}

/// POST /memory/{character}
pub async fn add_memory(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
    Json(request): Json<AddMemoryRequest>,
) -> Result<(StatusCode, Json<AddMemoryResponse>), ApiError> {
    let receipt = state
        .coordinator
        .add(&character, &request.content, request.metadata)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AddMemoryResponse {
            id: receipt.memory_id,
            stored_in: receipt.stored_in.as_str().to_string(),
            evicted_to_buffer: receipt.evicted_to_buffer,
            buffer_auto_embedded: receipt.buffer_auto_embedded,
        }),
    ))
}

/// GET /memory/{character}
pub async fn get_recent(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
) -> Result<Json<RecentMemoriesResponse>, ApiError> {
    let memories = state.coordinator.get_recent(&character).await;
    Ok(Json(RecentMemoriesResponse {
        count: memories.len(),
        memories,
    }))
}

/// GET /memory/{character}/search?query=&k=
pub async fn search(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.query.as_deref().ok_or_else(|| {
        ApiError(EngramError::Validation(
            "Missing required query parameter: query".to_string(),
        ))
    })?;

    let results = state.coordinator.search(&character, query, params.k).await?;
    Ok(Json(SearchResponse {
        count: results.len(),
        results,
    }))
}

/// GET /memory/{character}/context?query=&k=
pub async fn get_context(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ContextResponse>, ApiError> {
    let context = state
        .coordinator
        .get_context(&character, params.query.as_deref(), params.k)
        .await?;

    Ok(Json(ContextResponse {
        recent_count: context.recent.len(),
        relevant_count: context.relevant.len(),
        recent: context.recent,
        relevant: context.relevant,
    }))
}

/// DELETE /memory/{character}
pub async fn clear_character(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
) -> Result<Json<ClearReport>, ApiError> {
    let report = state.coordinator.clear(&character).await?;
    Ok(Json(report))
}
