//! In-memory collaborators for integration tests.
//!
//! - `FakeRuntime`: container runtime with scripted failures
//! - `FakeAdmin`: administrative channel holding one config per primary
//! - `SequenceNames`: name generator returning a fixed sequence

#![allow(dead_code)]

use async_trait::async_trait;
use replctl::{
    AdminChannel, CommandResult, ContainerHandle, ContainerInfo, ContainerRuntime,
    ContainerSummary, Error, NameGenerator, ReplicaSetConfig, Result,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::Barrier;

// =============================================================================
// Fake Container Runtime
// =============================================================================

#[derive(Debug, Clone)]
struct FakeContainer {
    id: String,
    name: String,
    running: bool,
    address: Option<String>,
}

#[derive(Default)]
struct RuntimeState {
    containers: BTreeMap<String, FakeContainer>,
    created: u32,
    started: u32,
    addresses: VecDeque<String>,
    fail_start: HashSet<String>,
    fail_inspect: HashSet<String>,
    removed: Vec<String>,
}

/// Container runtime kept entirely in memory.
///
/// Started containers get the next address from the pool, or
/// `10.0.0.<n>` once the pool is empty.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<RuntimeState>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_addresses(addresses: Vec<String>) -> Self {
        let runtime = Self::default();
        runtime.state.lock().unwrap().addresses = addresses.into();
        runtime
    }

    /// Adds a container created outside the control plane.
    pub fn seed(&self, name: &str, address: Option<&str>) -> String {
        let mut state = self.state.lock().unwrap();
        state.created += 1;
        let id = format!("ext{:04}", state.created);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: name.to_string(),
                running: address.is_some(),
                address: address.map(str::to_string),
            },
        );
        id
    }

    /// Deletes a container behind the control plane's back.
    pub fn vanish(&self, name: &str) {
        let mut state = self.state.lock().unwrap();
        state.containers.retain(|_, c| c.name != name);
    }

    pub fn fail_start(&self, name: &str) {
        self.state.lock().unwrap().fail_start.insert(name.to_string());
    }

    pub fn fail_inspect(&self, name: &str) {
        self.state.lock().unwrap().fail_inspect.insert(name.to_string());
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn container_count(&self) -> usize {
        self.state.lock().unwrap().containers.len()
    }

    pub fn has_container(&self, name: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .containers
            .values()
            .any(|c| c.name == name)
    }

    fn find<'a>(state: &'a mut RuntimeState, key: &str) -> Option<&'a mut FakeContainer> {
        state
            .containers
            .values_mut()
            .find(|c| c.id == key || c.name == key)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create(&self, name: &str, _image: &str, _args: &[String]) -> Result<ContainerHandle> {
        let mut state = self.state.lock().unwrap();
        if state.containers.values().any(|c| c.name == name) {
            return Err(Error::Runtime {
                operation: "create",
                id: name.to_string(),
                reason: "Conflict. The container name is already in use".to_string(),
            });
        }
        state.created += 1;
        let id = format!("c{:04}", state.created);
        state.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                name: name.to_string(),
                running: false,
                address: None,
            },
        );
        Ok(ContainerHandle { id })
    }

    async fn start(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let name = Self::find(&mut state, id)
            .map(|c| c.name.clone())
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        if state.fail_start.contains(&name) {
            return Err(Error::Runtime {
                operation: "start",
                id: id.to_string(),
                reason: "port is already allocated".to_string(),
            });
        }
        state.started += 1;
        let n = state.started;
        let address = state
            .addresses
            .pop_front()
            .unwrap_or_else(|| format!("10.0.0.{n}"));
        if let Some(c) = Self::find(&mut state, id) {
            c.running = true;
            c.address = Some(address);
        }
        Ok(())
    }

    async fn inspect(&self, id: &str) -> Result<ContainerInfo> {
        let mut state = self.state.lock().unwrap();
        let container = Self::find(&mut state, id)
            .cloned()
            .ok_or_else(|| Error::ContainerNotFound(id.to_string()))?;
        if state.fail_inspect.contains(&container.name) {
            return Err(Error::Runtime {
                operation: "inspect",
                id: id.to_string(),
                reason: "daemon unavailable".to_string(),
            });
        }
        Ok(ContainerInfo {
            id: container.id,
            name: container.name,
            address: container.address,
            running: container.running,
            image: "asangpet/mongodb".to_string(),
            created: None,
        })
    }

    async fn list(&self, include_stopped: bool) -> Result<Vec<ContainerSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .values()
            .filter(|c| include_stopped || c.running)
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                names: vec![format!("/{}", c.name)],
                image: "asangpet/mongodb".to_string(),
                state: if c.running { "running" } else { "exited" }.to_string(),
            })
            .collect())
    }

    async fn remove(&self, id: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let before = state.containers.len();
        state.containers.retain(|_, c| c.id != id && c.name != id);
        if state.containers.len() == before {
            return Err(Error::ContainerNotFound(id.to_string()));
        }
        state.removed.push(id.to_string());
        Ok(())
    }
}

// =============================================================================
// Fake Administrative Channel
// =============================================================================

#[derive(Default)]
struct AdminState {
    configs: HashMap<String, ReplicaSetConfig>,
    initiated: Vec<(String, ReplicaSetConfig)>,
    reconfigured: Vec<(String, ReplicaSetConfig)>,
    reject_initiate: Option<String>,
    reject_reconfigure: Option<String>,
    broken: bool,
}

/// Administrative channel that stores the last accepted config per target.
#[derive(Default)]
pub struct FakeAdmin {
    state: Mutex<AdminState>,
    fetch_barrier: Option<Arc<Barrier>>,
}

impl FakeAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `fetch_config` wait until `parties` fetches are in flight.
    pub fn with_fetch_barrier(parties: usize) -> Self {
        Self {
            fetch_barrier: Some(Arc::new(Barrier::new(parties))),
            ..Self::default()
        }
    }

    pub fn reject_initiate(&self, errmsg: &str) {
        self.state.lock().unwrap().reject_initiate = Some(errmsg.to_string());
    }

    pub fn reject_reconfigure(&self, errmsg: &str) {
        self.state.lock().unwrap().reject_reconfigure = Some(errmsg.to_string());
    }

    /// Makes every call fail as if the shell printed garbage.
    pub fn break_channel(&self) {
        self.state.lock().unwrap().broken = true;
    }

    pub fn config(&self, target: &str) -> Option<ReplicaSetConfig> {
        self.state.lock().unwrap().configs.get(target).cloned()
    }

    pub fn initiated(&self) -> Vec<(String, ReplicaSetConfig)> {
        self.state.lock().unwrap().initiated.clone()
    }

    pub fn reconfigured(&self) -> Vec<(String, ReplicaSetConfig)> {
        self.state.lock().unwrap().reconfigured.clone()
    }

    fn check_broken(&self, operation: &'static str, target: &str) -> Result<()> {
        if self.state.lock().unwrap().broken {
            return Err(Error::Administrative {
                operation,
                target: target.to_string(),
                reason: "undecodable reply: expected value at line 1 column 1".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AdminChannel for FakeAdmin {
    async fn initiate(&self, target: &str, config: &ReplicaSetConfig) -> Result<CommandResult> {
        self.check_broken("initiate", target)?;
        let mut state = self.state.lock().unwrap();
        state.initiated.push((target.to_string(), config.clone()));
        if let Some(errmsg) = state.reject_initiate.clone() {
            return Ok(CommandResult::failure(errmsg));
        }
        state.configs.insert(target.to_string(), config.clone());
        Ok(CommandResult::success())
    }

    async fn fetch_config(&self, target: &str) -> Result<ReplicaSetConfig> {
        self.check_broken("fetch_config", target)?;
        let config = self.state.lock().unwrap().configs.get(target).cloned();
        if let Some(barrier) = &self.fetch_barrier {
            barrier.wait().await;
        }
        config.ok_or_else(|| Error::Administrative {
            operation: "fetch_config",
            target: target.to_string(),
            reason: "undecodable reply: invalid type: null".to_string(),
        })
    }

    async fn reconfigure(
        &self,
        target: &str,
        config: &ReplicaSetConfig,
        _force: bool,
    ) -> Result<CommandResult> {
        self.check_broken("reconfigure", target)?;
        let mut state = self.state.lock().unwrap();
        state.reconfigured.push((target.to_string(), config.clone()));
        if let Some(errmsg) = state.reject_reconfigure.clone() {
            return Ok(CommandResult::failure(errmsg));
        }
        state.configs.insert(target.to_string(), config.clone());
        Ok(CommandResult::success())
    }
}

// =============================================================================
// Names
// =============================================================================

/// Name generator returning a fixed sequence, then `node-<n>`.
#[derive(Default)]
pub struct SequenceNames {
    queue: Mutex<VecDeque<String>>,
    fallback: Mutex<u32>,
}

impl SequenceNames {
    pub fn new(names: &[&str]) -> Self {
        Self {
            queue: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
            fallback: Mutex::new(0),
        }
    }
}

impl NameGenerator for SequenceNames {
    fn generate(&self) -> String {
        if let Some(name) = self.queue.lock().unwrap().pop_front() {
            return name;
        }
        let mut n = self.fallback.lock().unwrap();
        *n += 1;
        format!("node-{}", *n)
    }
}

// =============================================================================
// Listeners
// =============================================================================

/// Binds `count` loopback listeners and returns them with their addresses.
///
/// The listeners must stay alive for dials to succeed.
pub async fn listening_addresses(count: usize) -> (Vec<TcpListener>, Vec<String>) {
    let mut listeners = Vec::with_capacity(count);
    let mut addresses = Vec::with_capacity(count);
    for _ in 0..count {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        addresses.push(listener.local_addr().unwrap().to_string());
        listeners.push(listener);
    }
    (listeners, addresses)
}
