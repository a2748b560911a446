//! Instance types.
//!
//! An instance is a tracked container. Its capabilities depend on how the
//! control plane came to know it:
//!
//! - [`BaseInstance`]: discovered by a rescan. Inspect-only.
//! - [`DataNode`]: created by the control plane from the data-store image.
//!   Can be dialed, can initiate a replica set, can join one.
//!
//! [`Instance`] is the sum of the two. Callers that need data-node
//! behavior match on it (or use [`Instance::as_data_node`]), so asking a
//! discovered container to join a cluster does not type-check.

use crate::admin::{AdminChannel, CommandResult, ReplicaSetConfig};
use crate::constants::{
    CONNECT_ATTEMPT_TIMEOUT, CONNECT_DEADLINE, CONNECT_INITIAL_BACKOFF, CONNECT_MAX_BACKOFF,
    DATA_STORE_PORT,
};
use crate::error::{Error, Result};
use crate::runtime::{ContainerInfo, ContainerRuntime};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// =============================================================================
// Instance Variants
// =============================================================================

/// Container tracked without data-store capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseInstance {
    /// Container ID.
    pub id: String,
    /// Network address; `None` until the container is running.
    pub address: Option<String>,
}

impl BaseInstance {
    /// Wraps an inspected container.
    pub fn from_container(info: &ContainerInfo) -> Self {
        Self {
            id: info.id.clone(),
            address: info.address.clone(),
        }
    }

    /// Fetches the current runtime state of this container.
    pub async fn inspect(&self, runtime: &dyn ContainerRuntime) -> Result<ContainerInfo> {
        runtime.inspect(&self.id).await
    }
}

/// Container running the data store, created by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataNode {
    /// Container ID.
    pub id: String,
    /// Network address; `None` until the container is running.
    pub address: Option<String>,
}

/// Tracked container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instance {
    /// Discovered container, inspect-only.
    Base(BaseInstance),
    /// Data-store node.
    DataNode(DataNode),
}

impl Instance {
    /// Container ID.
    pub fn id(&self) -> &str {
        match self {
            Self::Base(b) => &b.id,
            Self::DataNode(d) => &d.id,
        }
    }

    /// Network address, if the container was running when tracked.
    pub fn address(&self) -> Option<&str> {
        match self {
            Self::Base(b) => b.address.as_deref(),
            Self::DataNode(d) => d.address.as_deref(),
        }
    }

    /// Variant name as used in serialized form.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Base(_) => "base",
            Self::DataNode(_) => "data_node",
        }
    }

    /// Returns the data-node view, if this is one.
    pub fn as_data_node(&self) -> Option<&DataNode> {
        match self {
            Self::DataNode(d) => Some(d),
            Self::Base(_) => None,
        }
    }

    /// Fetches the current runtime state of this container.
    pub async fn inspect(&self, runtime: &dyn ContainerRuntime) -> Result<ContainerInfo> {
        match self {
            Self::Base(b) => b.inspect(runtime).await,
            Self::DataNode(d) => runtime.inspect(&d.id).await,
        }
    }
}

impl From<BaseInstance> for Instance {
    fn from(b: BaseInstance) -> Self {
        Self::Base(b)
    }
}

impl From<DataNode> for Instance {
    fn from(d: DataNode) -> Self {
        Self::DataNode(d)
    }
}

// =============================================================================
// Connect Policy
// =============================================================================

/// Bounds for dialing a freshly started data node.
///
/// Delays grow `initial_backoff, 2×, 4×, ...` up to `max_backoff`; the whole
/// attempt sequence stops at `deadline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectPolicy {
    /// Port to dial when the address carries none.
    pub port: u16,
    /// First delay between attempts.
    pub initial_backoff: Duration,
    /// Ceiling for one delay.
    pub max_backoff: Duration,
    /// Time limit across all attempts.
    pub deadline: Duration,
    /// Time limit for one dial.
    pub attempt_timeout: Duration,
}

impl Default for ConnectPolicy {
    fn default() -> Self {
        Self {
            port: DATA_STORE_PORT,
            initial_backoff: CONNECT_INITIAL_BACKOFF,
            max_backoff: CONNECT_MAX_BACKOFF,
            deadline: CONNECT_DEADLINE,
            attempt_timeout: CONNECT_ATTEMPT_TIMEOUT,
        }
    }
}

impl ConnectPolicy {
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    #[must_use]
    pub fn with_attempt_timeout(mut self, attempt_timeout: Duration) -> Self {
        self.attempt_timeout = attempt_timeout;
        self
    }

    /// Delay to wait after a failed attempt that used `current`.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_backoff)
    }
}

// =============================================================================
// Session
// =============================================================================

/// Open connection to a data node.
///
/// Used as a readiness check: once a session opens, the data store accepts
/// commands. Dropping the session closes the socket.
#[derive(Debug)]
pub struct Session {
    stream: TcpStream,
    peer: String,
    attempts: u32,
}

impl Session {
    /// Address the session is connected to.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Number of dials it took to open the session.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Shuts the connection down.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

// =============================================================================
// Data Node Operations
// =============================================================================

/// A membership command as submitted, with the data store's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Configuration sent with `replSetInitiate` or `replSetReconfig`.
    pub config: ReplicaSetConfig,
    /// Reply of the node the command ran on.
    pub result: CommandResult,
}

impl DataNode {
    /// Creates a data node record.
    pub fn new(id: impl Into<String>, address: Option<String>) -> Self {
        Self {
            id: id.into(),
            address,
        }
    }

    /// Wraps an inspected container.
    pub fn from_container(info: &ContainerInfo) -> Self {
        Self::new(info.id.clone(), info.address.clone())
    }

    /// Returns the node's address or [`Error::NoAddress`].
    pub fn require_address(&self) -> Result<&str> {
        self.address
            .as_deref()
            .ok_or_else(|| Error::NoAddress(self.id.clone()))
    }

    /// Dials the node until it accepts a connection.
    ///
    /// Retries with exponential backoff inside `policy.deadline`. Returns
    /// [`Error::Connection`] once the deadline passes and
    /// [`Error::Cancelled`] as soon as `cancel` fires.
    pub async fn connect(
        &self,
        policy: &ConnectPolicy,
        cancel: &CancellationToken,
    ) -> Result<Session> {
        let address = self.require_address()?;
        let target = dial_target(address, policy.port);
        let started = Instant::now();
        let mut delay = policy.initial_backoff;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let remaining = policy.deadline.saturating_sub(started.elapsed());
            let attempt_timeout = policy.attempt_timeout.min(remaining);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("connect to {target}")));
                }
                dialed = timeout(attempt_timeout, TcpStream::connect(target.as_str())) => match dialed {
                    Ok(Ok(stream)) => {
                        info!(%target, attempts, "Obtained data store session");
                        return Ok(Session { stream, peer: target.clone(), attempts });
                    }
                    Ok(Err(e)) => debug!(%target, attempts, "dial failed: {}", e),
                    Err(_) => debug!(%target, attempts, "dial timed out after {:?}", attempt_timeout),
                }
            }

            let elapsed = started.elapsed();
            if elapsed >= policy.deadline {
                warn!(%target, attempts, "giving up on data node after {:?}", elapsed);
                return Err(Error::Connection {
                    address: target,
                    attempts,
                    elapsed,
                });
            }

            let pause = delay.min(policy.deadline - elapsed);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("connect to {target}")));
                }
                _ = sleep(pause) => {}
            }
            delay = policy.next_backoff(delay);
        }
    }

    /// Initiates a single-member replica set named `cluster_id` on this node.
    ///
    /// A rejected command is logged and returned, not turned into an error.
    pub async fn init_set(
        &self,
        channel: &dyn AdminChannel,
        cluster_id: &str,
    ) -> Result<Submission> {
        let address = self.require_address()?;
        let config = ReplicaSetConfig::initial(cluster_id, address);
        info!(%address, config = %serde_json::to_string(&config)?, "initiating replica set");

        let result = channel.initiate(address, &config).await?;
        if result.is_ok() {
            info!(%address, "replica set initiated");
        } else {
            warn!(%address, reason = %result.reason(), "replSetInitiate rejected");
        }
        Ok(Submission { config, result })
    }

    /// Adds this node to the replica set whose primary is at `primary`.
    ///
    /// Reads the primary's configuration, appends this node with the next
    /// member ID, bumps the version and submits it with `force: false`.
    /// Not safe to run concurrently against one primary: two joins can read
    /// the same document and claim the same member ID.
    pub async fn join_cluster(&self, channel: &dyn AdminChannel, primary: &str) -> Result<Submission> {
        let address = self.require_address()?;
        info!(%address, %primary, "joining replica set");

        let current = channel.fetch_config(primary).await?;
        debug!(%primary, version = ?current.version, members = current.members.len(), "existing configuration");

        let config = current.with_member(address);
        info!(%primary, config = %serde_json::to_string(&config)?, "submitting reconfiguration");

        let result = channel.reconfigure(primary, &config, false).await?;
        if result.is_ok() {
            info!(%address, %primary, version = ?config.version, "joined replica set");
        } else {
            warn!(%address, %primary, reason = %result.reason(), "replSetReconfig rejected");
        }
        Ok(Submission { config, result })
    }
}

/// Builds `host:port` unless `address` already names a socket address.
fn dial_target(address: &str, port: u16) -> String {
    if address.parse::<SocketAddr>().is_ok() {
        address.to_string()
    } else {
        format!("{address}:{port}")
    }
}
