//! # openveth-container
//!
//! Container lifecycle management for openveth.
//!
//! Talks to the Docker daemon through a single shared client handle:
//!
//! - **Manager**: idempotent node provisioning (create or adopt),
//!   bootstrap-interface rename, PID lookup, removal, label-keyed
//!   cleanup sweep
//! - **Introspection**: live interface enumeration via an in-container
//!   `ip -j addr` exec
//! - **Deployer**: realizes a whole topology document, nodes first,
//!   then links

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod deploy;
pub mod error;
pub mod introspect;
pub mod manager;

pub use deploy::deploy_topology;
pub use error::{ContainerError, Result};
pub use manager::{Manager, MANAGED_LABEL, NAME_LABEL};
