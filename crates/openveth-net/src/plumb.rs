//! High-level link plumbing.
//!
//! Composes the netlink engine and the namespace context to realize
//! topology links: veth pairs created in the host namespace, endpoints
//! moved into the connected containers, renamed to their declared
//! names and brought up.
//!
//! There is no rollback of a half-built pair: if a step fails the
//! remains stay on the host under their temporary names and are
//! reclaimed by the global cleanup sweep.

use std::os::unix::io::AsRawFd;

use ipnetwork::IpNetwork;
use openveth_core::Link;

use crate::error::{NetError, Result};
use crate::netlink::{LinkType, NetlinkHandle};
use crate::netns::{netns_file, with_namespace};

/// Queue length for topology veth pairs.
pub const VETH_TXQUEUE_LEN: u32 = 1000;

/// Truncates to at most `max` bytes, backing up to the nearest UTF-8
/// boundary. The interface-name limit is an octet count, so the
/// prefixes must be measured in bytes, not codepoints.
fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Temporary host-side names for a link's veth pair, derived from the
/// first five bytes of the link id. Both stay within the kernel's
/// 15-octet interface-name limit.
#[must_use]
pub fn host_veth_names(link_id: &str) -> (String, String) {
    let prefix = truncate_bytes(link_id, 5);
    (format!("veth{prefix}_s"), format!("veth{prefix}_t"))
}

/// Host-side and transient peer names for a bridge port, derived from
/// the PID and the first three bytes of the container interface name.
#[must_use]
pub fn bridge_port_names(pid: u32, container_iface: &str) -> (String, String) {
    let suffix = truncate_bytes(container_iface, 3);
    let host = format!("v{pid}-{suffix}");
    let peer = format!("{host}c");
    (host, peer)
}

/// Kernel-level network plumbing for topology links.
///
/// Stateless; every operation opens its own netlink sockets, including
/// a fresh one inside each entered namespace.
#[derive(Debug, Default, Clone, Copy)]
pub struct NetworkManager;

impl NetworkManager {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Creates a veth pair for `link` and installs one end in each
    /// container.
    ///
    /// Steps, in order: create the pair in the host namespace with
    /// TxQueueLen 1000, then for each end move it into the target
    /// namespace by fd, rename it in-namespace to its declared name
    /// and bring it up.
    ///
    /// # Errors
    ///
    /// Returns an error on any failed step. An already-created pair is
    /// not removed; cleanup recovers it.
    pub fn create_link(&self, link: &Link, pid_source: u32, pid_target: u32) -> Result<()> {
        let (host_source, host_target) = host_veth_names(&link.id);

        let mut handle = NetlinkHandle::new()?;
        handle.create_veth_pair(&host_source, &host_target, Some(VETH_TXQUEUE_LEN))?;

        move_and_configure(&mut handle, &host_source, &link.source_int, pid_source)?;
        move_and_configure(&mut handle, &host_target, &link.target_int, pid_target)?;

        tracing::info!(
            link = %link.id,
            source = %link.source_id,
            source_int = %link.source_int,
            target = %link.target_id,
            target_int = %link.target_int,
            "link created"
        );
        Ok(())
    }

    /// Creates a bridge and brings it up. Idempotent: an existing link
    /// by that name is success.
    ///
    /// # Errors
    ///
    /// Returns an error if creation or activation fails.
    pub fn create_bridge(&self, name: &str) -> Result<()> {
        let mut handle = NetlinkHandle::new()?;
        if handle.get_ifindex(name).is_ok() {
            return Ok(());
        }

        let ifindex = handle.create_link(name, LinkType::Bridge)?;
        handle.set_link_state(ifindex, true)?;

        tracing::info!(bridge = %name, "bridge created");
        Ok(())
    }

    /// Connects a container to a host bridge with a dedicated veth
    /// pair: the host side is enslaved to the bridge, the peer side is
    /// moved into the container and renamed to `container_iface`.
    ///
    /// # Errors
    ///
    /// Fails if the bridge is absent or any plumbing step fails.
    pub fn connect_node_to_bridge(
        &self,
        pid: u32,
        container_iface: &str,
        bridge_name: &str,
    ) -> Result<()> {
        let (host_name, peer_name) = bridge_port_names(pid, container_iface);

        let mut handle = NetlinkHandle::new()?;
        handle.create_veth_pair(&host_name, &peer_name, None)?;

        let bridge = handle
            .get_ifindex(bridge_name)
            .map_err(|_| NetError::Bridge(format!("bridge not found: {bridge_name}")))?;

        let host = handle.get_ifindex(&host_name)?;
        handle.set_link_master(host, bridge)?;
        handle.set_link_state(host, true)?;

        move_and_configure(&mut handle, &peer_name, container_iface, pid)?;

        tracing::info!(
            pid,
            iface = %container_iface,
            bridge = %bridge_name,
            "node connected to bridge"
        );
        Ok(())
    }

    /// Assigns `cidr` (e.g. `10.0.0.1/24`) to an interface inside the
    /// namespace of `pid`.
    ///
    /// # Errors
    ///
    /// Fails if the CIDR is malformed, the interface is missing, or
    /// assignment fails.
    pub fn set_interface_ip(&self, pid: u32, iface_name: &str, cidr: &str) -> Result<()> {
        let addr: IpNetwork = cidr
            .parse()
            .map_err(|e| NetError::Address(format!("invalid CIDR {cidr}: {e}")))?;

        with_namespace(pid, || {
            let mut handle = NetlinkHandle::new()?;
            let ifindex = handle.get_ifindex(iface_name)?;
            handle.add_address(ifindex, addr)
        })?;

        tracing::info!(pid, iface = %iface_name, addr = %cidr, "address assigned");
        Ok(())
    }

    /// Deletes a named interface inside the namespace of `pid`.
    /// Deleting one end of a veth pair destroys the peer too, so this
    /// is enough to tear down a whole link.
    ///
    /// # Errors
    ///
    /// Fails if the interface is missing or deletion fails.
    pub fn delete_endpoint(&self, pid: u32, iface_name: &str) -> Result<()> {
        with_namespace(pid, || {
            let mut handle = NetlinkHandle::new()?;
            let ifindex = handle.get_ifindex(iface_name)?;
            handle.delete_link(ifindex)
        })
    }
}

/// Moves `host_name` into the namespace of `pid`, then renames it to
/// `container_name` and brings it up from inside that namespace.
fn move_and_configure(
    handle: &mut NetlinkHandle,
    host_name: &str,
    container_name: &str,
    pid: u32,
) -> Result<()> {
    let ifindex = handle.get_ifindex(host_name)?;
    let ns = netns_file(pid)?;
    handle.set_link_netns(ifindex, ns.as_raw_fd())?;

    with_namespace(pid, || {
        // The socket must live in the namespace it operates on.
        let mut inner = NetlinkHandle::new()?;
        let moved = inner
            .get_ifindex(host_name)
            .map_err(|e| NetError::Netlink(format!("moved interface not found: {e}")))?;
        inner.set_link_name(moved, container_name)?;
        let renamed = inner.get_ifindex(container_name)?;
        inner.set_link_state(renamed, true)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_veth_names_use_first_five_chars() {
        let (source, target) = host_veth_names("abcdef123");
        assert_eq!(source, "vethabcde_s");
        assert_eq!(target, "vethabcde_t");
    }

    #[test]
    fn host_veth_names_accept_short_ids() {
        let (source, target) = host_veth_names("L1");
        assert_eq!(source, "vethL1_s");
        assert_eq!(target, "vethL1_t");
    }

    #[test]
    fn bridge_port_names_truncate_iface() {
        let (host, peer) = bridge_port_names(1234, "eth1");
        assert_eq!(host, "v1234-eth");
        assert_eq!(peer, "v1234-ethc");
    }

    #[test]
    fn generated_names_fit_interface_name_limit() {
        // IFNAMSIZ is 16 including the terminator.
        for name in [
            host_veth_names("0123456789abcdef").0,
            host_veth_names("0123456789abcdef").1,
            bridge_port_names(4_194_304, "eth10").0,
            bridge_port_names(4_194_304, "eth10").1,
        ] {
            assert!(name.len() <= 15, "{name} exceeds 15 octets");
        }
    }

    #[test]
    fn multi_byte_ids_are_truncated_by_octets() {
        // Five four-byte codepoints; a codepoint-based prefix would
        // blow the 15-octet limit.
        let id = "\u{1F600}\u{1F601}\u{1F602}\u{1F603}\u{1F604}";
        let (source, target) = host_veth_names(id);
        assert!(source.len() <= 15, "{source} exceeds 15 octets");
        assert!(target.len() <= 15, "{target} exceeds 15 octets");
        // 5 bytes cuts into the second codepoint, so only the first
        // survives.
        assert_eq!(source, "veth\u{1F600}_s");

        let (host, peer) = bridge_port_names(4_194_304, "\u{00E9}th\u{00E9}");
        assert!(host.len() <= 15, "{host} exceeds 15 octets");
        assert!(peer.len() <= 15, "{peer} exceeds 15 octets");
        // "é" is two bytes, so three octets keep just "é" plus "t".
        assert_eq!(peer, "v4194304-\u{00E9}tc");
    }

    #[test]
    fn truncate_bytes_respects_char_boundaries() {
        assert_eq!(truncate_bytes("abcdef", 5), "abcde");
        assert_eq!(truncate_bytes("ab", 5), "ab");
        // Cutting mid-codepoint backs up to the previous boundary.
        assert_eq!(truncate_bytes("a\u{00E9}c", 2), "a");
        assert_eq!(truncate_bytes("\u{1F600}", 3), "");
    }

    #[test]
    fn malformed_cidr_is_rejected_before_namespace_entry() {
        let manager = NetworkManager::new();
        let result = manager.set_interface_ip(std::process::id(), "eth0", "not-a-cidr");
        assert!(matches!(result, Err(NetError::Address(_))));
    }
}
