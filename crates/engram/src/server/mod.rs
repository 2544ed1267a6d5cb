//! HTTP API for the memory service
//!
//! One resource per character under `/memory/{character}`, management
//! operations under `/admin`. Handlers map 1:1 onto coordinator operations;
//! no memory semantics live here.

pub mod admin;
pub mod memory;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::signal;

use crate::error::{EngramError, Result};
use crate::memory::MemoryCoordinator;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<MemoryCoordinator>,
}

/// The memory service HTTP server
pub struct MemoryServer {
    listen_addr: String,
    coordinator: Arc<MemoryCoordinator>,
}

impl MemoryServer {
    pub fn new(listen_addr: String, coordinator: Arc<MemoryCoordinator>) -> Self {
        Self {
            listen_addr,
            coordinator,
        }
    }

    /// Serve until ctrl-c / SIGTERM, then snapshot the recent tier.
    ///
    /// The buffer files and the vector index are already durable; the recent
    /// tier is the only state that must be flushed at shutdown.
    pub async fn serve(&self) -> Result<()> {
        let state = Arc::new(AppState {
            coordinator: self.coordinator.clone(),
        });
        let app = create_router(state);

        let addr: SocketAddr = self
            .listen_addr
            .parse()
            .map_err(|e| EngramError::Config(format!("Invalid listen address: {e}")))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| EngramError::Config(format!("Failed to bind to {addr}: {e}")))?;

        tracing::info!("Memory service listening on {addr}");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| EngramError::Storage(format!("Server error: {e}")))?;

        tracing::info!("Snapshotting recent tier before exit");
        self.coordinator.snapshot().await?;

        tracing::info!("Memory service shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/memory/{character}", post(memory::add_memory))
        .route("/memory/{character}", get(memory::get_recent))
        .route("/memory/{character}", delete(memory::clear_character))
        .route("/memory/{character}/search", get(memory::search))
        .route("/memory/{character}/context", get(memory::get_context))
        .route("/admin/characters", get(admin::list_characters))
        .route("/admin/char/{character}/memories", get(admin::paginated_memories))
        .route("/admin/char/{character}/embed-now", post(admin::embed_now))
        .route("/admin/memory/{character}/{id}", put(admin::update_memory))
        .route("/admin/memory/{character}/{id}", delete(admin::delete_memory))
        .route("/admin/import", post(admin::import_memories))
        .route("/admin/export/{character}", get(admin::export_memories))
        .route("/admin/health", get(admin::health))
        .with_state(state)
}

/// Liveness probe - returns JSON status
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Error wrapper that maps the core taxonomy onto HTTP statuses
pub struct ApiError(pub EngramError);

impl From<EngramError> for ApiError {
    fn from(e: EngramError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response<Body> {
        let (status, error_type) = match &self.0 {
            EngramError::EmptyContent => (StatusCode::BAD_REQUEST, "empty_content"),
            EngramError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            EngramError::EmbeddingUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
            }
            EngramError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failure"),
            EngramError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_failure"),
            EngramError::Config(_)
            | EngramError::Io(_)
            | EngramError::Serialization(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = serde_json::json!({
            "error": {
                "type": error_type,
                "message": self.0.to_string(),
            }
        });

        (status, Json(body)).into_response()
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
