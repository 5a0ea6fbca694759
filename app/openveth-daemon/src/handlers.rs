//! Request handlers for the management API.
//!
//! Node and link handlers compose the store, the lifecycle manager and
//! the link plumbing. Blocking netlink work is dispatched through
//! `spawn_blocking`; the namespace context below it pins its own OS
//! thread for the in-namespace steps.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use openveth_core::{Link, Node, Topology};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::api::AppState;
use crate::error::{ApiError, Result};

/// Liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListNodesQuery {
    live: Option<String>,
}

/// Lists persisted nodes, optionally decorated with live interface
/// records.
pub async fn list_nodes(
    State(state): State<AppState>,
    Query(query): Query<ListNodesQuery>,
) -> Result<Json<Vec<Node>>> {
    let mut nodes = state.repo.list_nodes().await?;

    if query.live.as_deref() == Some("true") {
        for node in &mut nodes {
            if node.container_id.is_empty() {
                continue;
            }
            match state.manager.get_node_interfaces(&node.container_id).await {
                Ok(interfaces) => node.interfaces = interfaces,
                Err(e) => debug!(node = %node.name, "live interface query failed: {e}"),
            }
        }
    }

    Ok(Json(nodes))
}

/// Creates a container for the node and persists it with its runtime
/// attributes.
pub async fn create_node(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Node>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(mut node) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_node(&node)?;

    let container_id = state.manager.create_node(&node).await?;
    let pid = state.manager.get_node_pid(&container_id).await?;

    node.container_id = container_id;
    node.pid = pid;
    node.interfaces.clear();
    state.repo.save_node(&node).await?;

    Ok((StatusCode::CREATED, Json(node)))
}

/// Removes the node's container and its row.
pub async fn delete_node(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let node = state
        .repo
        .get_node(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("node not found".to_string()))?;

    if let Err(e) = state.manager.delete_node(&node.name).await {
        warn!(node = %node.name, "container removal failed: {e}");
    }
    state.repo.delete_node(&id).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Live interface listing for one node.
pub async fn get_node_interfaces(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<openveth_core::InterfaceInfo>>> {
    let node = state
        .repo
        .get_node(&id)
        .await?
        .ok_or_else(|| ApiError::NotFound("node not found".to_string()))?;

    if node.container_id.is_empty() {
        return Err(ApiError::Unavailable("node is not running".to_string()));
    }

    let interfaces = state.manager.get_node_interfaces(&node.container_id).await?;
    Ok(Json(interfaces))
}

/// Lists persisted links.
pub async fn list_links(State(state): State<AppState>) -> Result<Json<Vec<Link>>> {
    Ok(Json(state.repo.list_links().await?))
}

/// Plumbs a veth pair between two running nodes and persists the link.
pub async fn create_link(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Link>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(link) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    validate_link(&link)?;

    let source = state.repo.get_node(&link.source_id).await?;
    let target = state.repo.get_node(&link.target_id).await?;
    let (Some(source), Some(target)) = (source, target) else {
        return Err(ApiError::BadRequest(
            "source or target node not found".to_string(),
        ));
    };

    // Undirected uniqueness: reject the pair in either direction.
    let existing = state.repo.list_links().await?;
    if existing.iter().any(|l| l.same_endpoints(&link)) {
        return Err(ApiError::Conflict(
            "link already exists between these nodes".to_string(),
        ));
    }

    let source_pid = u32::try_from(source.pid).unwrap_or(0);
    let target_pid = u32::try_from(target.pid).unwrap_or(0);

    let network = state.network;
    let plumb = link.clone();
    tokio::task::spawn_blocking(move || network.create_link(&plumb, source_pid, target_pid))
        .await
        .map_err(|e| ApiError::Internal(format!("plumbing task failed: {e}")))??;

    state.repo.save_link(&link).await?;
    Ok((StatusCode::CREATED, Json(link)))
}

/// Removes a link row, tearing down its veth pair best-effort first.
pub async fn delete_link(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    if let Some(link) = state.repo.get_link(&id).await? {
        teardown_link_endpoints(&state, &link).await;
    }
    state.repo.delete_link(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Deletes the link's interface inside one of its containers; one end
/// is enough since removing it destroys the peer. Failures are logged
/// only — the labeled cleanup sweep is the backstop.
async fn teardown_link_endpoints(state: &AppState, link: &Link) {
    let endpoints = [
        (&link.source_id, &link.source_int),
        (&link.target_id, &link.target_int),
    ];
    for (node_id, iface) in endpoints {
        let Ok(Some(node)) = state.repo.get_node(node_id).await else {
            continue;
        };
        let Ok(pid) = u32::try_from(node.pid) else {
            continue;
        };
        if pid == 0 || iface.is_empty() {
            continue;
        }

        let network = state.network;
        let iface = iface.clone();
        match tokio::task::spawn_blocking(move || network.delete_endpoint(pid, &iface)).await {
            Ok(Ok(())) => {
                debug!(link = %link.id, "link endpoints removed");
                return;
            }
            Ok(Err(e)) => warn!(link = %link.id, "endpoint teardown failed: {e}"),
            Err(e) => warn!(link = %link.id, "endpoint teardown task failed: {e}"),
        }
    }
}

/// Force-removes every managed container and clears the store.
pub async fn cleanup(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    if let Err(e) = state.manager.cleanup().await {
        warn!("cleanup sweep failed: {e}");
    }
    state.repo.clear_all().await?;
    Ok(Json(json!({ "message": "cleanup complete" })))
}

/// Deploys a whole topology document and persists the result.
pub async fn deploy_topology(
    State(state): State<AppState>,
    payload: std::result::Result<Json<Topology>, JsonRejection>,
) -> Result<Json<Topology>> {
    let Json(topology) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    for node in &topology.nodes {
        validate_node(node)?;
    }

    let deployed =
        openveth_container::deploy_topology(&state.manager, state.network, &topology).await?;

    for node in &deployed.nodes {
        state.repo.save_node(node).await?;
    }
    for link in &deployed.links {
        state.repo.save_link(link).await?;
    }

    Ok(Json(deployed))
}

fn validate_node(node: &Node) -> Result<()> {
    for (field, value) in [("id", &node.id), ("name", &node.name), ("image", &node.image)] {
        if value.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "missing required node field: {field}"
            )));
        }
    }
    Ok(())
}

fn validate_link(link: &Link) -> Result<()> {
    let fields = [
        ("id", &link.id),
        ("source", &link.source_id),
        ("target", &link.target_id),
        ("source_int", &link.source_int),
        ("target_int", &link.target_int),
    ];
    for (field, value) in fields {
        if value.is_empty() {
            return Err(ApiError::BadRequest(format!(
                "missing required link field: {field}"
            )));
        }
    }
    Ok(())
}
