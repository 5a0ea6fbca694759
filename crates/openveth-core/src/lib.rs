//! # openveth-core
//!
//! Data model and persistence for openveth.
//!
//! This crate defines the topology document shapes (nodes, links,
//! interface records) shared across the workspace, and the repository
//! abstraction that stores them:
//!
//! - **Memory store**: process-local map behind a readers-writer lock
//! - **SQL store**: sqlite or postgres, selected at startup
//!
//! The daemon falls back to the memory store when SQL initialization
//! fails, so a missing database never prevents the lab from running.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod store;
pub mod topology;

pub use store::{Driver, MemoryRepository, Repository, SqlRepository, StoreConfig, StoreError};
pub use topology::{InterfaceAddress, InterfaceInfo, Link, Node, NodeType, Topology};
