//! Admin endpoints - developer and operator surface
//!
//! Cross-tier listing, individual memory edits, forced embedding, bulk
//! import/export, and component health.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::memory::coordinator::{
    ExportBundle, HealthReport, ImportMemory, ImportReport, MemoryPage,
};
use crate::memory::types::{CharacterStats, Metadata};

use super::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct CharacterListResponse {
    pub characters: Vec<CharacterStats>,
    pub total: usize,
}

#[derive(Debug, Deserialize)]
pub struct PageParams {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemoryRequest {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

#[derive(Debug, Serialize)]
pub struct UpdateMemoryResponse {
    pub updated_in: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteMemoryResponse {
    pub deleted_from: String,
}

#[derive(Debug, Serialize)]
pub struct EmbedNowResponse {
    pub character_id: String,
    pub embedded_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub memories: Vec<ImportMemory>,
}

/// GET /admin/characters
pub async fn list_characters(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CharacterListResponse>, ApiError> {
    let characters = state.coordinator.list_characters().await?;
    Ok(Json(CharacterListResponse {
        total: characters.len(),
        characters,
    }))
}

/// GET /admin/char/{character}/memories?page=&limit=
pub async fn paginated_memories(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<MemoryPage>, ApiError> {
    let page = state
        .coordinator
        .paginated(&character, params.page.unwrap_or(1), params.limit.unwrap_or(50))
        .await?;
    Ok(Json(page))
}

/// PUT /admin/memory/{character}/{id}
pub async fn update_memory(
    State(state): State<Arc<AppState>>,
    Path((character, id)): Path<(String, String)>,
    Json(request): Json<UpdateMemoryRequest>,
) -> Result<Json<UpdateMemoryResponse>, ApiError> {
    let location = state
        .coordinator
        .update(&character, &id, &request.content, request.metadata)
        .await?;
    Ok(Json(UpdateMemoryResponse {
        updated_in: location.as_str().to_string(),
    }))
}

/// DELETE /admin/memory/{character}/{id}
pub async fn delete_memory(
    State(state): State<Arc<AppState>>,
    Path((character, id)): Path<(String, String)>,
) -> Result<Json<DeleteMemoryResponse>, ApiError> {
    let location = state.coordinator.delete(&character, &id).await?;
    Ok(Json(DeleteMemoryResponse {
        deleted_from: location.as_str().to_string(),
    }))
}

/// POST /admin/char/{character}/embed-now
pub async fn embed_now(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
) -> Result<Json<EmbedNowResponse>, ApiError> {
    let embedded_count = state.coordinator.force_embed(&character).await?;
    Ok(Json(EmbedNowResponse {
        character_id: character,
        embedded_count,
    }))
}

/// POST /admin/import
///
/// Partial success returns 207 with the per-item failure list.
pub async fn import_memories(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportReport>), ApiError> {
    let report = state.coordinator.import(request.memories).await?;
    let status = if report.failed.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(report)))
}

/// GET /admin/export/{character}
pub async fn export_memories(
    State(state): State<Arc<AppState>>,
    Path(character): Path<String>,
) -> Result<Json<ExportBundle>, ApiError> {
    let bundle = state.coordinator.export(&character).await?;
    Ok(Json(bundle))
}

/// GET /admin/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    Json(state.coordinator.health().await)
}
