//! Management API router.
//!
//! All application endpoints live under `/api/v1`; `/health` answers
//! at the root for liveness probes.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use openveth_container::Manager;
use openveth_core::Repository;
use openveth_net::NetworkManager;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::{handlers, terminal};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Container lifecycle manager (shared engine client).
    pub manager: Arc<Manager>,
    /// Kernel-level link plumbing.
    pub network: NetworkManager,
    /// Topology store.
    pub repo: Arc<dyn Repository>,
}

/// Creates the management router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api_routes())
        // Mirror-origin CORS with credentials, for the browser UI.
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/terminal", get(terminal::handle_terminal))
        .route("/nodes", get(handlers::list_nodes).post(handlers::create_node))
        .route("/nodes/:id", delete(handlers::delete_node))
        .route("/nodes/:id/interfaces", get(handlers::get_node_interfaces))
        .route("/links", get(handlers::list_links).post(handlers::create_link))
        .route("/links/:id", delete(handlers::delete_link))
        .route("/system/cleanup", delete(handlers::cleanup))
        .route("/topology/deploy", post(handlers::deploy_topology))
}
