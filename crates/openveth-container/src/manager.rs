//! Container lifecycle manager.
//!
//! Every managed container runs `sleep infinity` as its main process
//! (the PID hosts the network namespace the plumbing attaches to),
//! carries the management labels, and has its engine-provided `eth0`
//! renamed to `mgmt0` right after start so lab interfaces can own the
//! `eth*` names.

use std::collections::HashMap;

use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, HostConfig};
use bollard::Docker;
use futures::StreamExt;
use openveth_core::Node;
use tracing::{info, warn};

use crate::error::{is_engine_not_found, ContainerError, Result};

/// Label carried by every managed container; the cleanup sweep targets
/// exactly the containers where it equals `"true"`.
pub const MANAGED_LABEL: &str = "openveth";

/// Label recording the node name the container was created for.
pub const NAME_LABEL: &str = "openveth.name";

/// Talks to the container engine on behalf of the orchestrator.
///
/// Holds a single engine-client handle; the underlying client is
/// concurrency-safe and shared by all callers.
pub struct Manager {
    docker: Docker,
}

impl Manager {
    /// Connects to the local engine daemon.
    ///
    /// The connection is lazy; use [`test_connection`](Self::test_connection)
    /// to verify the daemon is reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed.
    pub fn new() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::Engine(format!("failed to connect to engine: {e}")))?;
        Ok(Self { docker })
    }

    /// Wraps an existing client handle.
    #[must_use]
    pub const fn with_client(docker: Docker) -> Self {
        Self { docker }
    }

    /// The shared engine client, for callers that drive exec streams
    /// directly (terminal bridge).
    #[must_use]
    pub const fn docker(&self) -> &Docker {
        &self.docker
    }

    /// Provisions a container for `node` and returns its id.
    ///
    /// Pulls the image when absent, creates the container with the
    /// management labels and `NET_ADMIN`/`SYS_ADMIN`, and starts it.
    /// A name conflict adopts the existing container instead of
    /// failing (starting it first if stopped). After a fresh start the
    /// bootstrap interface is renamed to `mgmt0`, best-effort.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be ensured or the
    /// container can neither be created nor adopted.
    pub async fn create_node(&self, node: &Node) -> Result<String> {
        info!(node = %node.name, image = %node.image, "orchestrating node");

        self.ensure_image(&node.image).await?;

        let labels = HashMap::from([
            (MANAGED_LABEL.to_string(), "true".to_string()),
            (NAME_LABEL.to_string(), node.name.clone()),
        ]);
        let config = Config {
            image: Some(node.image.clone()),
            cmd: Some(vec!["sleep".to_string(), "infinity".to_string()]),
            labels: Some(labels),
            host_config: Some(HostConfig {
                cap_add: Some(vec!["NET_ADMIN".to_string(), "SYS_ADMIN".to_string()]),
                nano_cpus: parse_nano_cpus(&node.cpu_request),
                memory: parse_memory_bytes(&node.ram_limit),
                ..Default::default()
            }),
            ..Default::default()
        };
        let options = CreateContainerOptions {
            name: node.name.as_str(),
            platform: None,
        };

        let created = match self.docker.create_container(Some(options), config).await {
            Ok(response) => response.id,
            Err(create_err) => return self.adopt_existing(&node.name, create_err).await,
        };

        self.docker
            .start_container(&created, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ContainerError::Engine(format!("failed to start container: {e}")))?;

        self.rename_bootstrap_interface(&created, &node.name).await;

        info!(node = %node.name, container = %short_id(&created), "node created and started");
        Ok(created)
    }

    /// Recovers from a create conflict by adopting the name-matched
    /// container. Surfaces the original creation error if inspection
    /// fails too.
    async fn adopt_existing(
        &self,
        name: &str,
        create_err: bollard::errors::Error,
    ) -> Result<String> {
        let Ok(inspect) = self.docker.inspect_container(name, None).await else {
            return Err(ContainerError::Engine(format!(
                "failed to create container: {create_err}"
            )));
        };

        let id = inspect.id.unwrap_or_else(|| name.to_string());
        info!(node = %name, container = %short_id(&id), "node already exists, reusing");

        let running = inspect
            .state
            .and_then(|state| state.running)
            .unwrap_or(false);
        if !running {
            info!(node = %name, "existing node was stopped, starting");
            self.docker
                .start_container(&id, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| {
                    ContainerError::Engine(format!("failed to start existing node: {e}"))
                })?;
        }

        Ok(id)
    }

    /// Renames `eth0` to `mgmt0` inside the container. Best-effort: a
    /// failure to set up the exec only logs a warning.
    async fn rename_bootstrap_interface(&self, container_id: &str, name: &str) {
        let exec = CreateExecOptions {
            cmd: Some(vec!["ip", "link", "set", "dev", "eth0", "name", "mgmt0"]),
            attach_stdout: Some(false),
            attach_stderr: Some(false),
            ..Default::default()
        };

        match self.docker.create_exec(container_id, exec).await {
            Ok(created) => {
                let _ = self
                    .docker
                    .start_exec(
                        &created.id,
                        Some(StartExecOptions {
                            detach: true,
                            ..Default::default()
                        }),
                    )
                    .await;
            }
            Err(e) => warn!(node = %name, "could not rename eth0 to mgmt0: {e}"),
        }
    }

    /// Returns the main-process PID of a running container.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown container, `NotRunning` when it is
    /// stopped or reports no live PID.
    pub async fn get_node_pid(&self, container_id: &str) -> Result<i64> {
        let inspect = self
            .docker
            .inspect_container(container_id, None)
            .await
            .map_err(|e| {
                if is_engine_not_found(&e) {
                    ContainerError::NotFound(container_id.to_string())
                } else {
                    ContainerError::Engine(format!("failed to inspect container: {e}"))
                }
            })?;

        let state = inspect
            .state
            .ok_or_else(|| ContainerError::NotRunning(container_id.to_string()))?;
        if !state.running.unwrap_or(false) {
            return Err(ContainerError::NotRunning(container_id.to_string()));
        }

        match state.pid {
            Some(pid) if pid > 0 => Ok(pid),
            _ => Err(ContainerError::NotRunning(container_id.to_string())),
        }
    }

    /// Force-removes a container by name. A not-found result is
    /// success.
    ///
    /// # Errors
    ///
    /// Returns an error for any engine failure other than not-found.
    pub async fn delete_node(&self, name: &str) -> Result<()> {
        info!(node = %name, "removing node");

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self.docker.remove_container(name, Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_engine_not_found(&e) => Ok(()),
            Err(e) => Err(ContainerError::Engine(format!(
                "failed to remove node {name}: {e}"
            ))),
        }
    }

    /// Verifies the engine daemon responds.
    ///
    /// # Errors
    ///
    /// Returns an error when the daemon is unreachable.
    pub async fn test_connection(&self) -> Result<()> {
        self.docker
            .ping()
            .await
            .map_err(|e| ContainerError::Engine(format!("engine daemon unreachable: {e}")))?;
        Ok(())
    }

    /// Lists all containers on the host, including stopped ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        Ok(self.docker.list_containers(Some(options)).await?)
    }

    /// Force-removes every container labeled `openveth=true` and
    /// returns how many were removed. Foreign containers are left
    /// alone; individual removal failures are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error only if the initial listing fails.
    pub async fn cleanup(&self) -> Result<usize> {
        let containers = self.list_containers().await?;
        let mut removed = 0;

        for container in containers {
            let managed = container
                .labels
                .as_ref()
                .and_then(|labels| labels.get(MANAGED_LABEL))
                .is_some_and(|value| value == "true");
            if !managed {
                continue;
            }

            let Some(id) = container.id else { continue };
            let options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };
            match self.docker.remove_container(&id, Some(options)).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(container = %short_id(&id), "cleanup removal failed: {e}"),
            }
        }

        info!(removed, "cleanup sweep finished");
        Ok(removed)
    }

    /// Ensures the image is available locally, pulling it if absent.
    /// The pull stream is drained to completion before returning.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(()),
            Err(e) if is_engine_not_found(&e) => {
                info!(image = %image, "image not found locally, pulling");

                let options = CreateImageOptions {
                    from_image: image,
                    ..Default::default()
                };
                let mut stream = self.docker.create_image(Some(options), None, None);
                while let Some(progress) = stream.next().await {
                    progress.map_err(|e| {
                        ContainerError::Image(format!("failed to pull image {image}: {e}"))
                    })?;
                }
                Ok(())
            }
            Err(e) => Err(ContainerError::Image(format!(
                "failed to inspect image {image}: {e}"
            ))),
        }
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(12)]
}

/// Parses a CPU hint like `"1.5"` into engine nano-CPUs. Empty or
/// unparseable hints pass through as `None`.
fn parse_nano_cpus(hint: &str) -> Option<i64> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }
    match hint.parse::<f64>() {
        Ok(cpus) if cpus > 0.0 => Some((cpus * 1_000_000_000.0) as i64),
        _ => {
            warn!(hint = %hint, "ignoring unparseable CPU hint");
            None
        }
    }
}

/// Parses a RAM hint like `"512m"` or `"2g"` into bytes. Empty or
/// unparseable hints pass through as `None`.
fn parse_memory_bytes(hint: &str) -> Option<i64> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }

    let (digits, multiplier) = match hint.chars().last() {
        Some('k' | 'K') => (&hint[..hint.len() - 1], 1024),
        Some('m' | 'M') => (&hint[..hint.len() - 1], 1024 * 1024),
        Some('g' | 'G') => (&hint[..hint.len() - 1], 1024 * 1024 * 1024),
        _ => (hint, 1),
    };

    match digits.parse::<i64>() {
        Ok(value) if value > 0 => Some(value * multiplier),
        _ => {
            warn!(hint = %hint, "ignoring unparseable RAM hint");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_hints_convert_to_nano_cpus() {
        assert_eq!(parse_nano_cpus("1.5"), Some(1_500_000_000));
        assert_eq!(parse_nano_cpus("2"), Some(2_000_000_000));
        assert_eq!(parse_nano_cpus(""), None);
        assert_eq!(parse_nano_cpus("lots"), None);
        assert_eq!(parse_nano_cpus("-1"), None);
    }

    #[test]
    fn ram_hints_convert_to_bytes() {
        assert_eq!(parse_memory_bytes("512m"), Some(512 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("2G"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_memory_bytes("1024"), Some(1024));
        assert_eq!(parse_memory_bytes(""), None);
        assert_eq!(parse_memory_bytes("much"), None);
    }

    #[test]
    fn short_id_handles_short_input() {
        assert_eq!(short_id("abc"), "abc");
        assert_eq!(short_id("0123456789abcdef"), "0123456789ab");
    }

    #[test]
    fn management_labels_are_fixed() {
        assert_eq!(MANAGED_LABEL, "openveth");
        assert_eq!(NAME_LABEL, "openveth.name");
    }
}
