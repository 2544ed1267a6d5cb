//! HTTP surface tests
//!
//! Drives the real router with in-process requests (no sockets) against a
//! coordinator backed by a temp directory and the mock embedder.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use engram::server::{create_router, AppState};
use engram::testing::coordinator_at;

async fn test_app() -> (Router, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = Arc::new(coordinator_at(dir.path(), 5, 10).await);
    let app = create_router(Arc::new(AppState { coordinator }));
    (app, dir)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn add_memory(app: &Router, character: &str, content: &str) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            &format!("/memory/{character}"),
            serde_json::json!({"content": content}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await
}

#[tokio::test]
async fn test_liveness_endpoint() {
    let (app, _dir) = test_app().await;

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_add_memory_created_with_receipt_fields() {
    let (app, _dir) = test_app().await;

    let body = add_memory(&app, "blacksmith", "the forge ran cold today").await;
    assert!(body["id"].as_str().unwrap().starts_with("mem_"));
    assert_eq!(body["stored_in"], "recent");
    assert_eq!(body["evicted_to_buffer"], false);
    assert_eq!(body["buffer_auto_embedded"], false);
}

#[tokio::test]
async fn test_add_memory_with_metadata_roundtrips() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/memory/blacksmith",
            serde_json::json!({
                "content": "the forge ran cold today",
                "metadata": {"mood": "grim", "quest_related": true}
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.oneshot(get_request("/memory/blacksmith")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["memories"][0]["metadata"]["mood"], "grim");
}

#[tokio::test]
async fn test_add_empty_content_is_400() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/memory/blacksmith",
            serde_json::json!({"content": "   "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "empty_content");
}

#[tokio::test]
async fn test_get_recent_unknown_character_is_empty_200() {
    let (app, _dir) = test_app().await;

    let response = app.oneshot(get_request("/memory/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
    assert!(body["memories"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_sixth_add_reports_eviction() {
    let (app, _dir) = test_app().await;

    for i in 1..=5 {
        add_memory(&app, "guard", &format!("patrol report {i}")).await;
    }
    let body = add_memory(&app, "guard", "patrol report 6").await;
    assert_eq!(body["evicted_to_buffer"], true);
    assert_eq!(body["buffer_auto_embedded"], false);
}

#[tokio::test]
async fn test_search_requires_query_param() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(get_request("/memory/guard/search"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "validation_failure");
}

#[tokio::test]
async fn test_search_empty_collection_is_empty_200() {
    let (app, _dir) = test_app().await;
    add_memory(&app, "guard", "patrol report 1").await;

    let response = app
        .oneshot(get_request("/memory/guard/search?query=patrol&k=3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_search_returns_scored_results() {
    let (app, _dir) = test_app().await;

    for i in 1..=15 {
        add_memory(&app, "guard", &format!("patrol report number {i}")).await;
    }

    let response = app
        .oneshot(get_request(
            "/memory/guard/search?query=patrol%20report%20number%203&k=3",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["count"], 3);
    assert_eq!(
        body["results"][0]["memory"]["content"],
        "patrol report number 3"
    );
    assert!(body["results"][0]["similarity_score"].as_f64().unwrap() > 0.5);
}

#[tokio::test]
async fn test_context_with_and_without_query() {
    let (app, _dir) = test_app().await;

    for i in 1..=15 {
        add_memory(&app, "guard", &format!("patrol report number {i}")).await;
    }

    let response = app
        .clone()
        .oneshot(get_request("/memory/guard/context"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["recent_count"], 5);
    assert_eq!(body["relevant_count"], 0);

    let response = app
        .oneshot(get_request(
            "/memory/guard/context?query=patrol%20report%20number%202&k=2",
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["recent_count"], 5);
    assert_eq!(body["relevant_count"], 2);
}

#[tokio::test]
async fn test_clear_character_reports_counts() {
    let (app, _dir) = test_app().await;

    for i in 1..=15 {
        add_memory(&app, "guard", &format!("patrol report number {i}")).await;
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/memory/guard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["recent_deleted"], 5);
    assert_eq!(body["buffer_deleted"], 0);
    assert_eq!(body["longterm_deleted"], 10);

    let response = app.oneshot(get_request("/admin/characters")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["total"], 0);
}

#[tokio::test]
async fn test_admin_characters_lists_stats() {
    let (app, _dir) = test_app().await;
    add_memory(&app, "guard", "patrol report").await;

    let response = app.oneshot(get_request("/admin/characters")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["characters"][0]["character_id"], "guard");
    assert_eq!(body["characters"][0]["recent_count"], 1);
    assert_eq!(body["characters"][0]["total_count"], 1);
}

#[tokio::test]
async fn test_admin_paginated_memories_newest_first_with_location() {
    let (app, _dir) = test_app().await;

    for i in 1..=7 {
        add_memory(&app, "guard", &format!("patrol report number {i}")).await;
    }

    let response = app
        .clone()
        .oneshot(get_request("/admin/char/guard/memories?page=1&limit=3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["total_memories"], 7);
    assert_eq!(body["total_pages"], 3);
    assert_eq!(body["memories"][0]["content"], "patrol report number 7");
    assert_eq!(body["memories"][0]["location"], "recent");

    // Out-of-range page and oversized limit are rejected
    let response = app
        .clone()
        .oneshot(get_request("/admin/char/guard/memories?page=9&limit=3"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = app
        .oneshot(get_request("/admin/char/guard/memories?limit=101"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_admin_update_memory_404_when_missing() {
    let (app, _dir) = test_app().await;
    add_memory(&app, "guard", "patrol report").await;

    let response = app
        .oneshot(json_request(
            "PUT",
            "/admin/memory/guard/mem_000000000000",
            serde_json::json!({"content": "revised"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "not_found");
}

#[tokio::test]
async fn test_admin_update_and_delete_roundtrip() {
    let (app, _dir) = test_app().await;

    let created = add_memory(&app, "guard", "original patrol report").await;
    let id = created["id"].as_str().unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/admin/memory/guard/{id}"),
            serde_json::json!({"content": "revised patrol report"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["updated_in"], "recent");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/admin/memory/guard/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["deleted_from"], "recent");

    let response = app.oneshot(get_request("/memory/guard")).await.unwrap();
    assert_eq!(body_json(response).await["count"], 0);
}

#[tokio::test]
async fn test_admin_embed_now() {
    let (app, _dir) = test_app().await;

    for i in 1..=8 {
        add_memory(&app, "guard", &format!("patrol report number {i}")).await;
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/char/guard/embed-now")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["character_id"], "guard");
    assert_eq!(body["embedded_count"], 3);

    // Second call with no intervening adds embeds nothing
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/char/guard/embed-now")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(body_json(response).await["embedded_count"], 0);
}

#[tokio::test]
async fn test_admin_import_partial_failure_is_207() {
    let (app, _dir) = test_app().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/import",
            serde_json::json!({
                "memories": [
                    {"character_id": "guard", "content": "imported patrol report"},
                    {"character_id": "guard", "content": "  "},
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);

    let body = body_json(response).await;
    assert_eq!(body["imported"], 1);
    assert_eq!(body["failed"][0]["index"], 1);
}

#[tokio::test]
async fn test_admin_import_full_success_is_200() {
    let (app, _dir) = test_app().await;

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/import",
            serde_json::json!({
                "memories": [
                    {"character_id": "guard", "content": "imported patrol report",
                     "timestamp": "2026-01-05T12:00:00Z"},
                ]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["imported"], 1);
}

#[tokio::test]
async fn test_admin_export_bundle_shape() {
    let (app, _dir) = test_app().await;
    add_memory(&app, "guard", "patrol report").await;

    let response = app
        .oneshot(get_request("/admin/export/guard"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["character_id"], "guard");
    assert_eq!(body["total_memories"], 1);
    assert_eq!(body["memories"][0]["location"], "recent");
    assert!(body["exported_at"].is_string());
}

#[tokio::test]
async fn test_admin_health_reports_components() {
    let (app, _dir) = test_app().await;

    let response = app.oneshot(get_request("/admin/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["embedding_engine"], "ready");
    assert_eq!(body["vector_store"], "connected");
    assert_eq!(body["recent_tier"], "operational");
}
