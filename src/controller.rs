//! # Controller
//!
//! Composes the [`InstanceRegistry`], the [`MembershipCoordinator`] and the
//! state of the one replica set this control plane manages.
//!
//! ## Operations
//!
//! | Operation         | Effect                                                    |
//! |-------------------|-----------------------------------------------------------|
//! | `create_instance` | Registry add; no membership change                         |
//! | `bootstrap`       | Add + connect + initiate; records the primary             |
//! | `grow`            | Add + connect + join the recorded primary                 |
//! | `rescan`          | Reconcile registry with the runtime                       |
//!
//! ## Cluster State
//!
//! Two locks, two jobs:
//!
//! ```text
//!   membership: Mutex<()>             held for a whole bootstrap / grow / seed
//!   cluster:    RwLock<ClusterState>  held only to read or write the record
//! ```
//!
//! The membership lock serializes every change to the replica set. The
//! primary is written while it is held, so each join reads it after the
//! bootstrap that recorded it. Readers such as [`Controller::primary`] only
//! touch the state lock and return while a bootstrap is still waiting on a
//! container. Plain instance creation takes neither.
//!
//! The primary is written once per cluster and not re-checked for liveness.
//! It is held in memory only; after a restart an operator can re-seed it
//! with [`Controller::seed_primary`].

use crate::admin::AdminChannel;
use crate::config::ControllerConfig;
use crate::error::{Error, Result};
use crate::instance::{DataNode, Instance};
use crate::membership::{AdminPolicy, MembershipCoordinator, MembershipOutcome};
use crate::names::NameGenerator;
use crate::registry::InstanceRegistry;
use crate::runtime::{ContainerInfo, ContainerRuntime, ContainerSummary};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Membership state of the managed replica set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterState {
    /// Replica-set name.
    pub cluster_id: String,
    /// Address of the node that initiated the set.
    pub primary: Option<String>,
    /// Members added through this controller, in join order.
    pub members: Vec<String>,
}

/// Elapsed time at each phase of a bootstrap or grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseTimings {
    /// Container created, started and inspected.
    pub create_ms: u64,
    /// Data store accepting connections.
    pub startup_ms: u64,
    /// Membership command finished.
    pub ready_ms: u64,
}

/// Detailed result of a bootstrap or grow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterReport {
    /// Registry name of the new node.
    pub name: String,
    /// The new node.
    pub instance: DataNode,
    /// Primary the operation ran against.
    pub primary: String,
    /// Membership command outcome.
    pub outcome: MembershipOutcome,
    pub timings: PhaseTimings,
}

/// Instance plus the name it is tracked under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceRecord {
    pub name: String,
    pub instance: Instance,
}

/// Control plane for one replica set.
pub struct Controller {
    config: ControllerConfig,
    registry: InstanceRegistry,
    coordinator: MembershipCoordinator,
    membership: Mutex<()>,
    cluster: RwLock<ClusterState>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a controller with an empty registry and an unformed cluster.
    pub fn new(
        config: ControllerConfig,
        runtime: Arc<dyn ContainerRuntime>,
        channel: Arc<dyn AdminChannel>,
        names: Arc<dyn NameGenerator>,
    ) -> Self {
        let registry = InstanceRegistry::new(runtime, names, config.template.clone());
        let coordinator =
            MembershipCoordinator::new(channel, config.cluster_id.clone(), config.admin_policy);
        let cluster = ClusterState {
            cluster_id: config.cluster_id.clone(),
            ..ClusterState::default()
        };

        Self {
            config,
            registry,
            coordinator,
            membership: Mutex::new(()),
            cluster: RwLock::new(cluster),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn registry(&self) -> &InstanceRegistry {
        &self.registry
    }

    // =========================================================================
    // Registry Operations
    // =========================================================================

    /// Creates a data node without touching cluster membership.
    pub async fn create_instance(&self, name: Option<&str>) -> Result<InstanceRecord> {
        let (name, node) = self.registry.add_instance(name).await?;
        Ok(InstanceRecord {
            name,
            instance: Instance::DataNode(node),
        })
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.registry.exists(name).await
    }

    pub async fn list_instances(&self) -> BTreeMap<String, Instance> {
        self.registry.list().await
    }

    pub async fn rescan(&self) -> Result<Vec<ContainerSummary>> {
        self.registry.rescan().await
    }

    /// Current runtime state of the instance tracked as `name`.
    pub async fn inspect(&self, name: &str) -> Result<ContainerInfo> {
        self.registry.inspect(name).await
    }

    // =========================================================================
    // Cluster Operations
    // =========================================================================

    /// Snapshot of the cluster state.
    pub async fn cluster_state(&self) -> ClusterState {
        self.cluster.read().await.clone()
    }

    /// Recorded primary address.
    pub async fn primary(&self) -> Option<String> {
        self.cluster.read().await.primary.clone()
    }

    /// Records `address` as primary of an already formed replica set.
    ///
    /// For re-attaching to a set after the controller restarted. Refuses to
    /// replace a recorded primary. Waits for an in-flight bootstrap or grow.
    pub async fn seed_primary(&self, address: impl Into<String>) -> Result<()> {
        let _membership = self.membership.lock().await;
        let mut cluster = self.cluster.write().await;
        if let Some(primary) = &cluster.primary {
            return Err(Error::ClusterAlreadyFormed(primary.clone()));
        }
        let address = address.into();
        info!(%address, "seeding primary");
        cluster.primary = Some(address);
        Ok(())
    }

    /// Creates a data node and initiates a new replica set on it.
    ///
    /// Fails with [`Error::ClusterAlreadyFormed`] if a primary is recorded.
    /// Under [`AdminPolicy::Advisory`] the primary is recorded even when
    /// the data store rejected the initiate; the report carries the outcome.
    pub async fn bootstrap(&self) -> Result<ClusterReport> {
        let _membership = self.membership.lock().await;
        if let Some(primary) = self.primary().await {
            return Err(Error::ClusterAlreadyFormed(primary));
        }

        let started = Instant::now();
        let (name, node, create_ms) = self.launch_node(started).await?;
        let address = node.require_address()?.to_string();
        info!(%address, "Initializing data node {}", name);
        let startup_ms = self.wait_ready(&node, started).await?;

        let outcome = self.coordinator.initiate(&node).await?;
        info!(primary = %address, "Setting primary");
        {
            let mut cluster = self.cluster.write().await;
            cluster.primary = Some(address.clone());
            cluster.members.push(address.clone());
        }

        let ready_ms = millis(started.elapsed());
        info!("[profile] service ready: {}ms", ready_ms);

        Ok(ClusterReport {
            name,
            instance: node,
            primary: address,
            outcome,
            timings: PhaseTimings {
                create_ms,
                startup_ms,
                ready_ms,
            },
        })
    }

    /// Creates a data node and joins it to the recorded primary.
    ///
    /// Fails with [`Error::ClusterNotFormed`] before the first bootstrap.
    pub async fn grow(&self) -> Result<ClusterReport> {
        let _membership = self.membership.lock().await;
        let primary = self.primary().await.ok_or(Error::ClusterNotFormed)?;

        let started = Instant::now();
        let (name, node, create_ms) = self.launch_node(started).await?;
        let address = node.require_address()?.to_string();
        info!(%address, "Initializing data node {}", name);
        let startup_ms = self.wait_ready(&node, started).await?;

        let outcome = self.coordinator.join(&node, &primary).await?;
        if outcome.is_applied() {
            self.cluster.write().await.members.push(address);
        } else if self.coordinator.policy() == AdminPolicy::Advisory {
            warn!(%primary, "node {} is running but not a replica-set member", name);
        }

        let ready_ms = millis(started.elapsed());
        info!("[profile] service ready: {}ms", ready_ms);

        Ok(ClusterReport {
            name,
            instance: node,
            primary,
            outcome,
            timings: PhaseTimings {
                create_ms,
                startup_ms,
                ready_ms,
            },
        })
    }

    /// Cancels in-flight connection attempts.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn launch_node(&self, started: Instant) -> Result<(String, DataNode, u64)> {
        let (name, node) = self.registry.add_instance(None).await?;
        let create_ms = millis(started.elapsed());
        info!("[profile] create instance: {}ms", create_ms);
        Ok((name, node, create_ms))
    }

    async fn wait_ready(&self, node: &DataNode, started: Instant) -> Result<u64> {
        let session = node
            .connect(&self.config.connect, &self.shutdown.child_token())
            .await?;
        if let Err(e) = session.close().await {
            debug!("closing readiness session: {}", e);
        }
        let startup_ms = millis(started.elapsed());
        info!("[profile] server startup: {}ms", startup_ms);
        Ok(startup_ms)
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
