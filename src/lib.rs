//! # replctl
//!
//! **Control plane for containerized MongoDB replica sets**
//!
//! This crate manages a small fleet of data-store instances, each running in
//! its own container. It can create an instance, bootstrap a new replica set
//! on a fresh instance, and grow that set by one replica at a time.
//! Replication and elections are left to the data store; container execution
//! is left to the container runtime.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            Controller                               │
//! │   create_instance · bootstrap · grow · rescan · list · inspect     │
//! ├───────────────────────────────┬─────────────────────────────────────┤
//! │       InstanceRegistry        │       MembershipCoordinator         │
//! │  name → Instance {Base,       │  initiate / join under AdminPolicy  │
//! │         DataNode}             │  ClusterState { primary } (rwlock)  │
//! │  rescan (runtime → registry)  │                                     │
//! ├───────────────────────────────┼─────────────────────────────────────┤
//! │   ContainerRuntime trait      │       AdminChannel trait            │
//! │   └─ DockerCli                │       └─ ScriptChannel<MongoShell>  │
//! └───────────────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! # Membership Protocol
//!
//! ```text
//!   bootstrap:  A.initiate({_id:"rs0", members:[{0, A}]})            → primary := A
//!   grow:       cfg := A.rs.conf(); cfg.members += {len, B}; cfg.version += 1
//!               A.replSetReconfig(cfg, force:false)
//! ```
//!
//! Grows are read-modify-write against the primary and must not interleave.
//! The controller serializes bootstrap and grow on a membership lock.
//!
//! # Failure Handling
//!
//! - **Runtime**: create/start/inspect failures fail the operation. A
//!   container that was created but did not come up is force-removed.
//! - **Connection**: dialing a new node uses bounded exponential backoff and
//!   observes cancellation; exhaustion is an error.
//! - **Administrative**: rejected membership commands are handled by
//!   [`AdminPolicy`]: reported in the [`ClusterReport`] (`Advisory`) or
//!   returned as errors (`FailFast`).
//!
//! # Example
//!
//! ```rust,ignore
//! use replctl::{Controller, ControllerConfig, DockerCli, MongoShell, RandomNames, ScriptChannel};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> replctl::Result<()> {
//!     let controller = Controller::new(
//!         ControllerConfig::default(),
//!         Arc::new(DockerCli::new()),
//!         Arc::new(ScriptChannel::new(MongoShell::new())),
//!         Arc::new(RandomNames),
//!     );
//!     controller.rescan().await?;
//!
//!     let report = controller.bootstrap().await?;
//!     println!("primary at {}", report.primary);
//!     controller.grow().await?;
//!     Ok(())
//! }
//! ```

pub mod admin;
pub mod config;
pub mod constants;
pub mod controller;
pub mod error;
pub mod instance;
pub mod membership;
pub mod names;
pub mod registry;
pub mod runtime;
pub mod runtimes;

// Re-exports
pub use admin::{
    AdminChannel, CommandResult, MongoShell, ReplicaMember, ReplicaSetConfig, ScriptChannel,
    ScriptExecutor,
};
pub use config::{ContainerTemplate, ControllerConfig};
pub use controller::{ClusterReport, ClusterState, Controller, InstanceRecord, PhaseTimings};
pub use error::{Error, Result};
pub use instance::{BaseInstance, ConnectPolicy, DataNode, Instance, Session, Submission};
pub use membership::{AdminPolicy, MembershipCoordinator, MembershipOutcome};
pub use names::{NameGenerator, RandomNames};
pub use registry::InstanceRegistry;
pub use runtime::{ContainerHandle, ContainerInfo, ContainerRuntime, ContainerSummary};
pub use runtimes::DockerCli;
