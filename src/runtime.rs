//! Container runtime gateway.
//!
//! The control plane never executes containers itself. It drives an external
//! runtime through this trait:
//! - `create`: Create a named container from an image and argument list
//! - `start`: Start a created container
//! - `inspect`: Fetch identity, address and run state
//! - `list`: Enumerate containers, optionally including stopped ones
//! - `remove`: Delete a container (used for compensating cleanup)
//!
//! The runtime's own view is authoritative. The registry reconciles against
//! `list` and never assumes its local map is complete.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Container Records
// =============================================================================

/// Handle returned by a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// Runtime-assigned container ID.
    pub id: String,
}

/// Detailed state of a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Runtime-assigned container ID.
    pub id: String,
    /// Container name without the runtime's leading `/`.
    pub name: String,
    /// Network address on the container bridge. `None` unless running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Whether the container's process is running.
    pub running: bool,
    /// Image the container was created from.
    #[serde(default)]
    pub image: String,
    /// Creation timestamp reported by the runtime.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
}

impl ContainerInfo {
    /// Creates a running container record with an address.
    pub fn running(id: impl Into<String>, name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: Some(address.into()),
            running: true,
            image: String::new(),
            created: None,
        }
    }

    /// Creates a stopped container record (no address).
    pub fn stopped(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            address: None,
            running: false,
            image: String::new(),
            created: None,
        }
    }
}

/// Entry of a container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Runtime-assigned container ID.
    pub id: String,
    /// Names as reported by the runtime, possibly with a leading `/`.
    pub names: Vec<String>,
    /// Image reference.
    #[serde(default)]
    pub image: String,
    /// Human-readable state ("running", "exited", ...).
    #[serde(default)]
    pub state: String,
}

impl ContainerSummary {
    /// Returns the registry name for this container: the first runtime
    /// name with any leading `/` stripped.
    pub fn registry_name(&self) -> Option<&str> {
        self.names
            .first()
            .map(|n| n.strip_prefix('/').unwrap_or(n))
            .filter(|n| !n.is_empty())
    }
}

// =============================================================================
// Runtime Gateway Trait
// =============================================================================

/// Gateway to the container runtime that hosts data-store instances.
///
/// # Lifecycle
///
/// ```text
/// create(name, image, args) → start(name) → inspect(id) → [remove(id)]
/// ```
///
/// All calls are blocking from the runtime's point of view; implementations
/// must bound them with a timeout so a stuck runtime surfaces as an error.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns the runtime name (for logs).
    fn name(&self) -> &str;

    /// Creates (but does not start) a container named `name`.
    async fn create(&self, name: &str, image: &str, args: &[String]) -> Result<ContainerHandle>;

    /// Starts a created container by name or ID.
    async fn start(&self, id: &str) -> Result<()>;

    /// Inspects a container by name or ID.
    async fn inspect(&self, id: &str) -> Result<ContainerInfo>;

    /// Lists containers. `include_stopped` mirrors `docker ps --all`.
    async fn list(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>>;

    /// Removes a container. With `force`, a running container is killed first.
    async fn remove(&self, id: &str, force: bool) -> Result<()>;
}
