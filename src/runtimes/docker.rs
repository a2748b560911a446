//! # Docker CLI Gateway
//!
//! Implements [`ContainerRuntime`] by shelling out to the `docker` binary.
//! Every call is a separate `tokio::process` invocation bounded by
//! [`RUNTIME_COMMAND_TIMEOUT`], so a wedged daemon becomes an error instead
//! of a stuck request.
//!
//! ## Command Mapping
//!
//! | Operation | Command                                           |
//! |-----------|---------------------------------------------------|
//! | create    | `docker create --name <name> <image> <args...>`   |
//! | start     | `docker start <id>`                               |
//! | inspect   | `docker inspect --type container <id>`            |
//! | list      | `docker ps [--all] --no-trunc --format {{json .}}`|
//! | remove    | `docker rm [--force] <id>`                        |
//!
//! [`ContainerRuntime`]: crate::runtime::ContainerRuntime
//! [`RUNTIME_COMMAND_TIMEOUT`]: crate::constants::RUNTIME_COMMAND_TIMEOUT

use crate::constants::{DOCKER_BINARY, MAX_COMMAND_OUTPUT, RUNTIME_COMMAND_TIMEOUT};
use crate::error::{Error, Result};
use crate::runtime::{ContainerHandle, ContainerInfo, ContainerRuntime, ContainerSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Container runtime gateway backed by the Docker CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
    timeout: Duration,
}

impl DockerCli {
    /// Creates a gateway using `docker` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(DOCKER_BINARY),
            timeout: RUNTIME_COMMAND_TIMEOUT,
        }
    }

    /// Uses a specific docker binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs a docker subcommand and returns stdout on success.
    async fn docker(&self, operation: &'static str, id: &str, args: &[&str]) -> Result<Vec<u8>> {
        debug!(binary = %self.binary.display(), "docker {}", args.join(" "));

        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("docker {operation} {id}"),
                duration: self.timeout,
            })?
            .map_err(|e| Error::runtime(operation, id, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.contains("No such container") || stderr.contains("No such object") {
                return Err(Error::ContainerNotFound(id.to_string()));
            }
            return Err(Error::runtime(
                operation,
                id,
                format!("{} ({})", stderr, output.status),
            ));
        }

        let mut stdout = output.stdout;
        if stdout.len() > MAX_COMMAND_OUTPUT {
            warn!("docker {} output truncated to {} bytes", operation, MAX_COMMAND_OUTPUT);
            stdout.truncate(MAX_COMMAND_OUTPUT);
        }
        Ok(stdout)
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create(&self, name: &str, image: &str, args: &[String]) -> Result<ContainerHandle> {
        let mut argv = vec!["create", "--name", name, image];
        argv.extend(args.iter().map(String::as_str));

        let out = self.docker("create", name, &argv).await?;
        let id = String::from_utf8_lossy(&out).trim().to_string();
        if id.is_empty() {
            return Err(Error::runtime("create", name, "runtime returned no container id"));
        }
        Ok(ContainerHandle { id })
    }

    async fn start(&self, id: &str) -> Result<()> {
        self.docker("start", id, &["start", id]).await?;
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInfo> {
        let out = self
            .docker("inspect", id, &["inspect", "--type", "container", id])
            .await?;
        parse_inspect(id, &out)
    }

    async fn list(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        let mut argv = vec!["ps"];
        if include_stopped {
            argv.push("--all");
        }
        argv.extend(["--no-trunc", "--format", "{{json .}}"]);

        let out = self.docker("list", "*", &argv).await?;
        parse_ps(&out)
    }

    async fn remove(&self, id: &str, force: bool) -> Result<()> {
        let mut argv = vec!["rm"];
        if force {
            argv.push("--force");
        }
        argv.push(id);
        self.docker("remove", id, &argv).await?;
        Ok(())
    }
}

// =============================================================================
// Output Parsing
// =============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectDoc {
    id: String,
    name: String,
    #[serde(default)]
    created: Option<DateTime<Utc>>,
    state: InspectState,
    #[serde(default)]
    config: Option<InspectConfig>,
    #[serde(default)]
    network_settings: Option<InspectNetwork>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectState {
    running: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectConfig {
    #[serde(default)]
    image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectNetwork {
    #[serde(rename = "IPAddress", default)]
    ip_address: String,
}

#[derive(Deserialize)]
struct PsLine {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Names", default)]
    names: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "State", default)]
    state: String,
}

/// Decodes `docker inspect` output (a JSON array with one element).
pub(crate) fn parse_inspect(id: &str, raw: &[u8]) -> Result<ContainerInfo> {
    let docs: Vec<InspectDoc> =
        serde_json::from_slice(raw).map_err(|e| Error::runtime("inspect", id, e))?;
    let doc = docs
        .into_iter()
        .next()
        .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;

    // The bridge address is reported as "" for stopped containers.
    let address = doc
        .network_settings
        .map(|n| n.ip_address)
        .filter(|ip| !ip.is_empty() && doc.state.running);

    Ok(ContainerInfo {
        id: doc.id,
        name: doc.name.strip_prefix('/').unwrap_or(&doc.name).to_string(),
        address,
        running: doc.state.running,
        image: doc.config.map(|c| c.image).unwrap_or_default(),
        created: doc.created,
    })
}

/// Decodes `docker ps --format {{json .}}` output (one JSON object per line).
pub(crate) fn parse_ps(raw: &[u8]) -> Result<Vec<ContainerSummary>> {
    let text = String::from_utf8_lossy(raw);
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| -> Result<ContainerSummary> {
            let entry: PsLine = serde_json::from_str(line)?;
            Ok(ContainerSummary {
                id: entry.id,
                names: entry
                    .names
                    .split(',')
                    .filter(|n| !n.is_empty())
                    .map(str::to_string)
                    .collect(),
                image: entry.image,
                state: entry.state,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSPECT_RUNNING: &str = r#"[{
        "Id": "4f2c9a",
        "Created": "2024-03-01T10:15:30.123456789Z",
        "Name": "/brave_hopper",
        "State": {"Status": "running", "Running": true},
        "Config": {"Image": "asangpet/mongodb"},
        "NetworkSettings": {"IPAddress": "172.17.0.2"}
    }]"#;

    const INSPECT_STOPPED: &str = r#"[{
        "Id": "9e1d07",
        "Name": "/old_node",
        "State": {"Status": "exited", "Running": false},
        "NetworkSettings": {"IPAddress": ""}
    }]"#;

    #[test]
    fn test_parse_inspect_running() {
        let info = parse_inspect("brave_hopper", INSPECT_RUNNING.as_bytes()).unwrap();
        assert_eq!(info.id, "4f2c9a");
        assert_eq!(info.name, "brave_hopper");
        assert_eq!(info.address.as_deref(), Some("172.17.0.2"));
        assert!(info.running);
        assert_eq!(info.image, "asangpet/mongodb");
        assert!(info.created.is_some());
    }

    #[test]
    fn test_parse_inspect_stopped_has_no_address() {
        let info = parse_inspect("old_node", INSPECT_STOPPED.as_bytes()).unwrap();
        assert!(!info.running);
        assert!(info.address.is_none());
    }

    #[test]
    fn test_parse_inspect_empty_array() {
        let err = parse_inspect("ghost", b"[]").unwrap_err();
        assert!(matches!(err, Error::ContainerNotFound(id) if id == "ghost"));
    }

    #[test]
    fn test_parse_ps_lines() {
        let raw = concat!(
            r#"{"ID":"aaa","Names":"first,alias","Image":"asangpet/mongodb","State":"running"}"#,
            "\n",
            r#"{"ID":"bbb","Names":"second","Image":"busybox","State":"exited"}"#,
            "\n\n"
        );
        let list = parse_ps(raw.as_bytes()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].names, vec!["first", "alias"]);
        assert_eq!(list[0].registry_name(), Some("first"));
        assert_eq!(list[1].state, "exited");
    }

    #[test]
    fn test_parse_ps_rejects_garbage() {
        assert!(parse_ps(b"not json").is_err());
    }

    #[test]
    fn test_runtime_name() {
        assert_eq!(DockerCli::new().name(), "docker");
    }
}
