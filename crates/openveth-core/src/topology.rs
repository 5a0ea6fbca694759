//! Topology document types.
//!
//! These shapes are the JSON wire format of the management API and the
//! row format of the SQL store. Runtime attributes (`container_id`,
//! `pid`) are populated by the orchestrator after provisioning;
//! `interfaces` is live data and is never persisted.

use serde::{Deserialize, Serialize};

/// Kind of virtual device a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Routing device (e.g. an FRR image).
    Router,
    /// Layer-2 device backed by a Linux bridge.
    Switch,
    /// Plain end host.
    #[default]
    Host,
}

impl NodeType {
    /// Returns the lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Switch => "switch",
            Self::Host => "host",
        }
    }

    /// Parses the lowercase wire name, defaulting to `Host` for
    /// anything unrecognized (older rows may carry free-form types).
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "router" => Self::Router,
            "switch" => Self::Switch,
            _ => Self::Host,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device in the topology.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    /// Client-supplied identifier (primary key).
    pub id: String,
    /// Human-readable name; used verbatim as the container name.
    pub name: String,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    /// Container image reference.
    pub image: String,
    /// Opaque CPU hint (e.g. "1.5"), passed through to the engine.
    #[serde(default)]
    pub cpu_request: String,
    /// Opaque RAM hint (e.g. "512m"), passed through to the engine.
    #[serde(default)]
    pub ram_limit: String,
    /// Canvas position, for UI use only.
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,

    /// Assigned on first successful provisioning.
    #[serde(default)]
    pub container_id: String,
    /// Main-process PID, assigned after start succeeds.
    #[serde(default)]
    pub pid: i64,

    /// Live interface records; populated on demand, never persisted.
    #[serde(default)]
    pub interfaces: Vec<InterfaceInfo>,
}

impl Node {
    /// A node is running once it has a container and a live PID.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.container_id.is_empty() && self.pid > 0
    }
}

/// A virtual cable (veth pair) between two nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Client-supplied identifier.
    pub id: String,
    #[serde(rename = "source")]
    pub source_id: String,
    #[serde(rename = "target")]
    pub target_id: String,
    /// Desired interface name inside the source container.
    #[serde(default)]
    pub source_int: String,
    /// Desired interface name inside the target container.
    #[serde(default)]
    pub target_int: String,
}

impl Link {
    /// True when both links connect the same unordered node pair.
    #[must_use]
    pub fn same_endpoints(&self, other: &Self) -> bool {
        (self.source_id == other.source_id && self.target_id == other.target_id)
            || (self.source_id == other.target_id && self.target_id == other.source_id)
    }
}

/// A live interface record, mapped from `ip -j addr` output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    #[serde(rename = "ifname", default)]
    pub name: String,
    #[serde(rename = "addr_info", default)]
    pub addresses: Vec<InterfaceAddress>,
}

/// One address on an interface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceAddress {
    #[serde(rename = "local", default)]
    pub address: String,
    #[serde(rename = "prefixlen", default)]
    pub prefix: u8,
}

/// A complete laboratory: nodes plus the cables between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub links: Vec<Link>,
}
