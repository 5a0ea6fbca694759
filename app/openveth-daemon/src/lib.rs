//! # openveth-daemon
//!
//! HTTP management surface for the openveth topology orchestrator.
//!
//! Serves the `/api/v1` node, link, topology and cleanup endpoints,
//! the `/health` probe, and the WebSocket terminal bridge. Handlers
//! compose the store (`openveth-core`), the container lifecycle
//! manager (`openveth-container`) and the link plumbing
//! (`openveth-net`).

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod error;
pub mod handlers;
pub mod server;
pub mod terminal;

pub use api::{create_router, AppState};
pub use error::ApiError;
