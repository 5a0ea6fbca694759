//! Live interface introspection.
//!
//! Runs `ip -j addr` inside a container over a non-TTY exec. The
//! engine multiplexes stdout and stderr over one stream; the client
//! surfaces them as typed chunks which are demultiplexed into separate
//! buffers before parsing.

use std::time::Duration;

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use futures::StreamExt;
use openveth_core::InterfaceInfo;
use tracing::warn;

use crate::error::{ContainerError, Result};
use crate::manager::Manager;

/// Hard deadline for the in-container listing.
const INTROSPECT_TIMEOUT: Duration = Duration::from_secs(5);

impl Manager {
    /// Enumerates the interfaces currently present inside a running
    /// container.
    ///
    /// Non-empty stderr is logged but does not fail the call as long
    /// as stdout parses.
    ///
    /// # Errors
    ///
    /// Returns an error if the exec cannot be created or attached,
    /// the 5-second deadline elapses, or stdout is not a valid
    /// interface listing.
    pub async fn get_node_interfaces(&self, container_id: &str) -> Result<Vec<InterfaceInfo>> {
        let exec = CreateExecOptions {
            cmd: Some(vec!["ip", "-j", "addr"]),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let created = self
            .docker()
            .create_exec(container_id, exec)
            .await
            .map_err(|e| ContainerError::Exec(format!("failed to create exec: {e}")))?;

        let started = self
            .docker()
            .start_exec(&created.id, None)
            .await
            .map_err(|e| ContainerError::Exec(format!("failed to start exec: {e}")))?;
        let StartExecResults::Attached { mut output, .. } = started else {
            return Err(ContainerError::Exec(
                "exec started detached, no output stream".to_string(),
            ));
        };

        let collect = async {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            while let Some(chunk) = output.next().await {
                match chunk.map_err(|e| ContainerError::Exec(format!("exec stream error: {e}")))? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.extend_from_slice(&message);
                    }
                    LogOutput::StdErr { message } => stderr.extend_from_slice(&message),
                    LogOutput::StdIn { .. } => {}
                }
            }
            Ok::<_, ContainerError>((stdout, stderr))
        };
        let (stdout, stderr) = tokio::time::timeout(INTROSPECT_TIMEOUT, collect)
            .await
            .map_err(|_| ContainerError::Deadline)??;

        if !stderr.is_empty() {
            warn!(
                container = %container_id,
                stderr = %String::from_utf8_lossy(&stderr),
                "interface listing wrote to stderr"
            );
        }

        parse_interfaces(&stdout)
    }
}

/// Parses `ip -j addr` output into interface records.
pub(crate) fn parse_interfaces(stdout: &[u8]) -> Result<Vec<InterfaceInfo>> {
    serde_json::from_slice(stdout).map_err(|e| ContainerError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trimmed-down capture of `ip -j addr` inside a managed container.
    const SAMPLE: &str = r#"[
        {
            "ifindex": 1,
            "ifname": "lo",
            "flags": ["LOOPBACK", "UP", "LOWER_UP"],
            "addr_info": [
                {"family": "inet", "local": "127.0.0.1", "prefixlen": 8}
            ]
        },
        {
            "ifindex": 14,
            "ifname": "mgmt0",
            "flags": ["BROADCAST", "MULTICAST", "UP", "LOWER_UP"],
            "addr_info": [
                {"family": "inet", "local": "172.17.0.2", "prefixlen": 16}
            ]
        },
        {
            "ifindex": 2,
            "ifname": "eth1",
            "flags": ["BROADCAST", "MULTICAST", "UP", "LOWER_UP"],
            "addr_info": []
        }
    ]"#;

    #[test]
    fn parses_interface_names_and_addresses() {
        let interfaces = parse_interfaces(SAMPLE.as_bytes()).unwrap();
        let names: Vec<_> = interfaces.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, ["lo", "mgmt0", "eth1"]);

        assert_eq!(interfaces[1].addresses[0].address, "172.17.0.2");
        assert_eq!(interfaces[1].addresses[0].prefix, 16);
        assert!(interfaces[2].addresses.is_empty());
    }

    #[test]
    fn rejects_non_json_output() {
        let result = parse_interfaces(b"Cannot open netlink socket");
        assert!(matches!(result, Err(ContainerError::Parse(_))));
    }

    #[test]
    fn empty_array_parses_to_no_interfaces() {
        assert!(parse_interfaces(b"[]").unwrap().is_empty());
    }
}
