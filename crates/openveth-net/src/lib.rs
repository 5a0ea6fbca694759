//! # openveth-net
//!
//! Kernel-level network plumbing for openveth.
//!
//! This crate realizes topology links as veth pairs whose endpoints
//! live inside container network namespaces:
//!
//! - **Namespace context**: scoped entry into a target namespace with a
//!   guaranteed return to the original one ([`netns::with_namespace`])
//! - **Netlink engine**: raw `NETLINK_ROUTE` socket operations (veth
//!   pairs, bridges, renames, link state, addresses)
//! - **Plumbing**: the high-level [`NetworkManager`] that composes the
//!   two to wire containers together
//!
//! Namespace membership is a property of an OS thread, so every
//! in-namespace step runs on a dedicated thread that switches in, does
//! its work, and switches back before anything else may run on it.

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod netlink;
pub mod netns;
pub mod plumb;

pub use error::{NetError, Result};
pub use plumb::{bridge_port_names, host_veth_names, NetworkManager, VETH_TXQUEUE_LEN};
