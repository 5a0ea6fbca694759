//! Topology deployment.
//!
//! Realizes a whole topology document: all nodes first (a node failure
//! aborts deployment), then all links (a link failure is logged and
//! the remaining links still get plumbed).

use std::collections::HashMap;

use openveth_core::Topology;
use openveth_net::NetworkManager;
use tracing::{error, info, warn};

use crate::error::{ContainerError, Result};
use crate::manager::Manager;

/// Deploys `topology` and returns a copy with runtime attributes
/// (container id, PID) populated on every node.
///
/// Links referencing unknown nodes are skipped with a warning;
/// per-link plumbing failures are logged and do not abort the
/// remaining links.
///
/// # Errors
///
/// Returns an error as soon as any node fails to provision.
pub async fn deploy_topology(
    manager: &Manager,
    network: NetworkManager,
    topology: &Topology,
) -> Result<Topology> {
    info!(
        topology = %topology.name,
        nodes = topology.nodes.len(),
        links = topology.links.len(),
        "deploying topology"
    );

    let mut deployed = topology.clone();
    let mut pids: HashMap<String, u32> = HashMap::new();

    for node in &mut deployed.nodes {
        let container_id = manager.create_node(node).await?;
        let pid = manager.get_node_pid(&container_id).await?;

        let pid = u32::try_from(pid)
            .map_err(|_| ContainerError::NotRunning(container_id.clone()))?;
        pids.insert(node.id.clone(), pid);

        node.container_id = container_id;
        node.pid = i64::from(pid);
    }

    for link in &deployed.links {
        let (Some(&source_pid), Some(&target_pid)) =
            (pids.get(&link.source_id), pids.get(&link.target_id))
        else {
            warn!(
                link = %link.id,
                source = %link.source_id,
                target = %link.target_id,
                "skipping link with unknown endpoint"
            );
            continue;
        };

        let plumb = link.clone();
        let result = tokio::task::spawn_blocking(move || {
            network.create_link(&plumb, source_pid, target_pid)
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(link = %link.id, "link plumbing failed: {e}"),
            Err(e) => error!(link = %link.id, "link plumbing task failed: {e}"),
        }
    }

    info!(topology = %deployed.name, "topology deployed");
    Ok(deployed)
}
