//! Router-level tests for the management API.
//!
//! These cover the handler paths that terminate before any engine or
//! kernel interaction: validation, lookup failures, and the
//! duplicate-link check.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use openveth_container::Manager;
use openveth_core::{Link, MemoryRepository, Node, Repository};
use openveth_daemon::{create_router, AppState};
use openveth_net::NetworkManager;
use tower::ServiceExt;

fn test_app() -> (Router, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let state = AppState {
        // The engine client connects lazily; none of these tests reach it.
        manager: Arc::new(Manager::new().unwrap()),
        network: NetworkManager::new(),
        repo: repo.clone(),
    };
    (create_router(state), repo)
}

fn json_post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn running_node(id: &str, name: &str, pid: i64) -> Node {
    Node {
        id: id.to_string(),
        name: name.to_string(),
        image: "alpine:latest".to_string(),
        container_id: format!("container-{id}"),
        pid,
        ..Default::default()
    }
}

#[tokio::test]
async fn health_reports_ok_and_version() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn list_nodes_starts_empty() {
    let (app, _) = test_app();

    let response = app
        .oneshot(Request::get("/api/v1/nodes").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!([]));
}

#[tokio::test]
async fn create_node_rejects_missing_fields() {
    let (app, _) = test_app();

    let response = app
        .oneshot(json_post("/api/v1/nodes", r#"{"id":"n1"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("name"));
}

#[tokio::test]
async fn delete_unknown_node_returns_404() {
    let (app, _) = test_app();

    let response = app
        .oneshot(
            Request::delete("/api/v1/nodes/ghost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn interfaces_of_unprovisioned_node_are_unavailable() {
    let (app, repo) = test_app();
    let mut node = running_node("n1", "h1", 0);
    node.container_id.clear();
    repo.save_node(&node).await.unwrap();

    let response = app
        .oneshot(
            Request::get("/api/v1/nodes/n1/interfaces")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn link_with_unknown_endpoint_is_rejected() {
    let (app, repo) = test_app();
    repo.save_node(&running_node("h1", "h1", 100)).await.unwrap();

    let response = app
        .oneshot(json_post(
            "/api/v1/links",
            r#"{"id":"L1","source":"h1","target":"ghost","source_int":"eth1","target_int":"eth1"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "source or target node not found");
}

#[tokio::test]
async fn duplicate_link_is_rejected_in_either_direction() {
    let (app, repo) = test_app();
    repo.save_node(&running_node("h1", "h1", 100)).await.unwrap();
    repo.save_node(&running_node("h2", "h2", 200)).await.unwrap();
    repo.save_link(&Link {
        id: "L1".to_string(),
        source_id: "h1".to_string(),
        target_id: "h2".to_string(),
        source_int: "eth1".to_string(),
        target_int: "eth1".to_string(),
    })
    .await
    .unwrap();

    for body in [
        r#"{"id":"L2","source":"h1","target":"h2","source_int":"eth2","target_int":"eth2"}"#,
        r#"{"id":"L3","source":"h2","target":"h1","source_int":"eth2","target_int":"eth2"}"#,
    ] {
        let response = app
            .clone()
            .oneshot(json_post("/api/v1/links", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    // The link set is untouched.
    assert_eq!(repo.list_links().await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_link_row_is_idempotent() {
    let (app, repo) = test_app();
    repo.save_link(&Link {
        id: "L1".to_string(),
        source_id: "a".to_string(),
        target_id: "b".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::delete("/api/v1/links/L1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
    assert!(repo.list_links().await.unwrap().is_empty());
}

#[tokio::test]
async fn terminal_requires_a_node_name() {
    let (app, _) = test_app();

    // A well-formed upgrade request, but no node parameter.
    let response = app
        .oneshot(
            Request::get("/api/v1/terminal")
                .header(header::CONNECTION, "upgrade")
                .header(header::UPGRADE, "websocket")
                .header(header::SEC_WEBSOCKET_VERSION, "13")
                .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "node name is required");
}

#[tokio::test]
async fn cleanup_clears_the_store_even_without_an_engine() {
    let (app, repo) = test_app();
    repo.save_node(&running_node("n1", "h1", 100)).await.unwrap();

    let response = app
        .oneshot(
            Request::delete("/api/v1/system/cleanup")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(repo.list_nodes().await.unwrap().is_empty());
}
