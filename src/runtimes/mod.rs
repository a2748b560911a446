//! Container runtime gateway implementations.
//!
//! Each gateway adapts one external runtime to the
//! [`ContainerRuntime`](crate::runtime::ContainerRuntime) trait.

pub mod docker;

pub use self::docker::DockerCli;
