//! # Instance Registry
//!
//! Name → [`Instance`] map reconciled against the container runtime.
//!
//! ## Mutation Model
//!
//! The map sits behind one async `RwLock`. Every mutation (reserve, insert,
//! release) happens inside a single write-lock scope; runtime calls never run
//! while the lock is held.
//!
//! Creating an instance is split in two steps so that name resolution and
//! runtime I/O do not share a critical section:
//!
//! ```text
//!   write lock { resolve name, insert Reserved }      ← collision check is atomic
//!   create → start → inspect                          ← runtime I/O, no lock
//!   write lock { Reserved → DataNode }  or  { remove Reserved } on failure
//! ```
//!
//! A reserved name counts as taken for collision checks but does not show up
//! in listings.
//!
//! ## Reconciliation
//!
//! [`InstanceRegistry::rescan`] adds every container the runtime knows about
//! (running or stopped) that is not yet tracked, as a [`BaseInstance`].
//! Tracked entries are never replaced. Entries whose container has been
//! deleted from the runtime are **kept**: the registry only grows, so a
//! listing can contain stale instances until the process restarts.

use crate::config::ContainerTemplate;
use crate::constants::validate_instance_name;
use crate::error::{Error, Result};
use crate::instance::{BaseInstance, DataNode, Instance};
use crate::names::NameGenerator;
use crate::runtime::{ContainerInfo, ContainerRuntime, ContainerSummary};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
enum Slot {
    /// Name claimed by a creation still in flight.
    Reserved,
    Ready(Instance),
}

/// Tracked instances keyed by name.
pub struct InstanceRegistry {
    runtime: Arc<dyn ContainerRuntime>,
    names: Arc<dyn NameGenerator>,
    template: ContainerTemplate,
    entries: RwLock<HashMap<String, Slot>>,
}

impl InstanceRegistry {
    /// Creates an empty registry.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        names: Arc<dyn NameGenerator>,
        template: ContainerTemplate,
    ) -> Self {
        Self {
            runtime,
            names,
            template,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Name of the container backend this registry drives.
    pub fn runtime_name(&self) -> &str {
        self.runtime.name()
    }

    /// Returns true if `name` is tracked or reserved.
    pub async fn exists(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    /// Returns the instance tracked under `name`.
    pub async fn get(&self, name: &str) -> Option<Instance> {
        match self.entries.read().await.get(name) {
            Some(Slot::Ready(instance)) => Some(instance.clone()),
            _ => None,
        }
    }

    /// Snapshot of all tracked instances, sorted by name.
    pub async fn list(&self) -> BTreeMap<String, Instance> {
        self.entries
            .read()
            .await
            .iter()
            .filter_map(|(name, slot)| match slot {
                Slot::Ready(instance) => Some((name.clone(), instance.clone())),
                Slot::Reserved => None,
            })
            .collect()
    }

    /// Number of tracked instances (reservations excluded).
    pub async fn len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|slot| matches!(slot, Slot::Ready(_)))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Tracks every runtime container not already in the registry.
    ///
    /// Returns the runtime's full listing. A container that cannot be
    /// inspected is skipped with a warning.
    pub async fn rescan(&self) -> Result<Vec<ContainerSummary>> {
        let containers = self.runtime.list(true).await?;

        let untracked: Vec<(&str, &ContainerSummary)> = {
            let entries = self.entries.read().await;
            containers
                .iter()
                .filter_map(|c| c.registry_name().map(|name| (name, c)))
                .filter(|(name, _)| !entries.contains_key(*name))
                .collect()
        };

        let mut discovered = Vec::with_capacity(untracked.len());
        for (name, container) in untracked {
            match self.runtime.inspect(&container.id).await {
                Ok(info) => discovered.push((name.to_string(), BaseInstance::from_container(&info))),
                Err(e) => warn!(container = %container.id, "skipping container during rescan: {}", e),
            }
        }

        if !discovered.is_empty() {
            let mut entries = self.entries.write().await;
            for (name, base) in discovered {
                // A concurrent creation may have claimed the name meanwhile.
                entries
                    .entry(name)
                    .or_insert_with(|| Slot::Ready(Instance::Base(base)));
            }
        }

        debug!(runtime = self.runtime.name(), containers = containers.len(), "rescan complete");
        Ok(containers)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Picks the name a creation will use.
    ///
    /// `requested` is used when it is non-empty and not taken; otherwise one
    /// name is generated. A generated name that collides is not retried.
    pub async fn resolve_name(&self, requested: Option<&str>) -> String {
        let entries = self.entries.read().await;
        self.pick_name(&entries, requested)
    }

    fn pick_name(&self, entries: &HashMap<String, Slot>, requested: Option<&str>) -> String {
        match requested.filter(|n| !n.is_empty()) {
            Some(name) if !entries.contains_key(name) => name.to_string(),
            Some(name) => {
                let fresh = self.names.generate();
                info!("name {} already in use, substituting {}", name, fresh);
                fresh
            }
            None => self.names.generate(),
        }
    }

    /// Resolves and claims a name in one critical section.
    ///
    /// Only a requested name that will actually be passed to the runtime is
    /// validated; a taken name is substituted whatever its spelling.
    async fn reserve(&self, requested: Option<&str>) -> Result<String> {
        let mut entries = self.entries.write().await;
        let name = self.pick_name(&entries, requested);
        if entries.contains_key(&name) {
            return Err(Error::InvalidName {
                name,
                reason: "generated name already in use".to_string(),
            });
        }
        if requested == Some(name.as_str()) {
            validate_instance_name(&name).map_err(|reason| Error::InvalidName {
                name: name.clone(),
                reason: reason.to_string(),
            })?;
        }
        entries.insert(name.clone(), Slot::Reserved);
        Ok(name)
    }

    async fn release(&self, name: &str) {
        let mut entries = self.entries.write().await;
        if matches!(entries.get(name), Some(Slot::Reserved)) {
            entries.remove(name);
        }
    }

    /// Creates, starts and tracks a new data node.
    ///
    /// The name follows [`resolve_name`](Self::resolve_name). If the runtime
    /// fails after the container was created, the container is force-removed
    /// before the error is returned.
    pub async fn add_instance(&self, requested: Option<&str>) -> Result<(String, DataNode)> {
        let name = self.reserve(requested).await?;

        match self.launch(&name).await {
            Ok(node) => {
                self.entries
                    .write()
                    .await
                    .insert(name.clone(), Slot::Ready(Instance::DataNode(node.clone())));
                Ok((name, node))
            }
            Err(e) => {
                self.release(&name).await;
                Err(e)
            }
        }
    }

    async fn launch(&self, name: &str) -> Result<DataNode> {
        info!(runtime = self.runtime.name(), image = %self.template.image, "Creating container {}", name);
        let handle = self
            .runtime
            .create(name, &self.template.image, &self.template.args)
            .await?;

        match self.start_and_inspect(name, &handle.id).await {
            Ok(info) => {
                info!(id = %info.id, address = ?info.address, "Started container {}", name);
                Ok(DataNode::from_container(&info))
            }
            Err(e) => {
                warn!("container {} failed to come up, removing it: {}", name, e);
                if let Err(cleanup) = self.runtime.remove(&handle.id, true).await {
                    warn!("failed to remove container {}: {}", handle.id, cleanup);
                }
                Err(e)
            }
        }
    }

    async fn start_and_inspect(&self, name: &str, id: &str) -> Result<ContainerInfo> {
        self.runtime.start(name).await?;
        self.runtime.inspect(id).await
    }

    /// Fetches the current runtime state of the instance tracked as `name`.
    ///
    /// Fails with [`Error::ContainerNotFound`] for an untracked name; a
    /// tracked instance whose container is gone yields the runtime's error.
    pub async fn inspect(&self, name: &str) -> Result<ContainerInfo> {
        let instance = self
            .get(name)
            .await
            .ok_or_else(|| Error::ContainerNotFound(name.to_string()))?;
        instance.inspect(self.runtime.as_ref()).await
    }
}
