//! Controller configuration.
//!
//! Every field starts from the defaults in [`crate::constants`] and can be
//! overridden with the `with_*` builders.

use crate::constants::{DEFAULT_CONTAINER_ARGS, DEFAULT_IMAGE, DEFAULT_REPLICA_SET_ID};
use crate::instance::ConnectPolicy;
use crate::membership::AdminPolicy;
use serde::{Deserialize, Serialize};

/// Image and arguments every new data node is created from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerTemplate {
    /// Image reference.
    pub image: String,
    /// Arguments passed to the image entrypoint.
    pub args: Vec<String>,
}

impl Default for ContainerTemplate {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            args: DEFAULT_CONTAINER_ARGS.iter().map(|a| a.to_string()).collect(),
        }
    }
}

impl ContainerTemplate {
    /// Template for `image` with the default replica-set arguments.
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }
}

/// Settings for a [`Controller`](crate::controller::Controller).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Container template for new data nodes.
    pub template: ContainerTemplate,
    /// Replica-set name.
    pub cluster_id: String,
    /// Dial bounds for new data nodes.
    pub connect: ConnectPolicy,
    /// Handling of rejected membership commands.
    pub admin_policy: AdminPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            template: ContainerTemplate::default(),
            cluster_id: DEFAULT_REPLICA_SET_ID.to_string(),
            connect: ConnectPolicy::default(),
            admin_policy: AdminPolicy::default(),
        }
    }
}

impl ControllerConfig {
    #[must_use]
    pub fn with_template(mut self, template: ContainerTemplate) -> Self {
        self.template = template;
        self
    }

    #[must_use]
    pub fn with_cluster_id(mut self, cluster_id: impl Into<String>) -> Self {
        self.cluster_id = cluster_id.into();
        self
    }

    #[must_use]
    pub fn with_connect_policy(mut self, connect: ConnectPolicy) -> Self {
        self.connect = connect;
        self
    }

    #[must_use]
    pub fn with_admin_policy(mut self, policy: AdminPolicy) -> Self {
        self.admin_policy = policy;
        self
    }
}
