//! End-to-end plumbing tests.
//!
//! These create real namespaces and interfaces and therefore require
//! root; they skip themselves otherwise. Each child process unshares
//! its own network namespace and stands in for a container's main
//! process.

use openveth_core::Link;
use openveth_net::netlink::NetlinkHandle;
use openveth_net::netns::with_namespace;
use openveth_net::{host_veth_names, NetworkManager};

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Forks a child that unshares a fresh network namespace and sleeps
/// until killed.
fn spawn_netns_child() -> u32 {
    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");

    if pid == 0 {
        // Child: detach into a new namespace and wait for the kill.
        unsafe {
            if libc::unshare(libc::CLONE_NEWNET) != 0 {
                libc::_exit(1);
            }
            loop {
                libc::pause();
            }
        }
    }

    // Give the child time to finish the unshare before we open
    // /proc/<pid>/ns/net.
    std::thread::sleep(std::time::Duration::from_millis(200));
    pid as u32
}

fn reap(pid: u32) {
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
        libc::waitpid(pid as i32, std::ptr::null_mut(), 0);
    }
}

fn iface_exists_in(pid: u32, name: &str) -> bool {
    with_namespace(pid, || {
        let handle = NetlinkHandle::new()?;
        Ok(handle.get_ifindex(name).is_ok())
    })
    .unwrap()
}

#[test]
fn create_link_wires_two_namespaces() {
    if !is_root() {
        eprintln!("Skipping test: requires root privileges");
        return;
    }

    let pid_source = spawn_netns_child();
    let pid_target = spawn_netns_child();

    let link = Link {
        id: "itest".to_string(),
        source_id: "a".to_string(),
        target_id: "b".to_string(),
        source_int: "eth1".to_string(),
        target_int: "eth1".to_string(),
    };

    let manager = NetworkManager::new();
    manager.create_link(&link, pid_source, pid_target).unwrap();

    // Both endpoints live inside their namespaces under the declared
    // names; the temporary host-side names are gone.
    assert!(iface_exists_in(pid_source, "eth1"));
    assert!(iface_exists_in(pid_target, "eth1"));

    let host = NetlinkHandle::new().unwrap();
    let (temp_source, temp_target) = host_veth_names(&link.id);
    assert!(host.get_ifindex(&temp_source).is_err());
    assert!(host.get_ifindex(&temp_target).is_err());

    // Address assignment works against the renamed endpoint.
    manager
        .set_interface_ip(pid_source, "eth1", "10.0.0.1/24")
        .unwrap();

    // Deleting one endpoint destroys the pair.
    manager.delete_endpoint(pid_source, "eth1").unwrap();
    assert!(!iface_exists_in(pid_target, "eth1"));

    reap(pid_source);
    reap(pid_target);
}

#[test]
fn bridge_creation_is_idempotent_and_accepts_ports() {
    if !is_root() {
        eprintln!("Skipping test: requires root privileges");
        return;
    }

    let bridge = "ovtestbr0";
    let manager = NetworkManager::new();

    manager.create_bridge(bridge).unwrap();
    // Second call sees the existing bridge and succeeds.
    manager.create_bridge(bridge).unwrap();

    let pid = spawn_netns_child();
    manager.connect_node_to_bridge(pid, "eth2", bridge).unwrap();
    assert!(iface_exists_in(pid, "eth2"));

    reap(pid);

    let mut host = NetlinkHandle::new().unwrap();
    let ifindex = host.get_ifindex(bridge).unwrap();
    host.delete_link(ifindex).unwrap();
}

#[test]
fn connecting_to_a_missing_bridge_fails() {
    if !is_root() {
        eprintln!("Skipping test: requires root privileges");
        return;
    }

    let pid = spawn_netns_child();
    let manager = NetworkManager::new();
    let result = manager.connect_node_to_bridge(pid, "eth3", "ovtest-nope");
    assert!(result.is_err());

    reap(pid);
}
