//! # Replica-Set Membership
//!
//! Drives a replica set's membership through the administrative channel.
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────────┐  initiate   ┌──────────────┐  join   ┌────────────────┐  join
//!   │ Unformed │ ──────────► │ 1 member, v1 │ ──────► │ 2 members, v+1 │ ──────► ...
//!   └──────────┘             └──────────────┘         └────────────────┘
//! ```
//!
//! Membership is append-only: a join appends `{_id: len(members), host}` and
//! bumps the version by one. Member IDs are never reused because members are
//! never removed.
//!
//! ## Serialization
//!
//! A join is a read-modify-write of the primary's configuration. Two joins
//! that interleave both read version `v` and both submit `v+1` with the same
//! new member ID. The coordinator does not lock; callers must serialize all
//! operations on one cluster (the [`Controller`](crate::controller::Controller)
//! holds its membership lock for the whole bootstrap or grow).
//!
//! ## Result Policy
//!
//! The data store can reject a command (`ok: 0`) or the channel can fail to
//! produce a decodable reply. [`AdminPolicy`] decides what the caller sees:
//!
//! | Policy     | Rejected / undecodable reply                      |
//! |------------|---------------------------------------------------|
//! | `Advisory` | Logged, reported as [`MembershipOutcome::Rejected`] |
//! | `FailFast` | Returned as [`Error::Administrative`]             |
//!
//! Errors unrelated to the data store (missing address, local I/O) are
//! returned under both policies.

use crate::admin::{AdminChannel, CommandResult, ReplicaSetConfig};
use crate::error::{Error, Result};
use crate::instance::{DataNode, Submission};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// What to do when the data store does not accept a membership command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminPolicy {
    /// Report the failure in the outcome and carry on.
    #[default]
    Advisory,
    /// Turn the failure into an error.
    FailFast,
}

impl std::str::FromStr for AdminPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "advisory" => Ok(Self::Advisory),
            "fail-fast" | "fail_fast" | "failfast" => Ok(Self::FailFast),
            other => Err(format!("unknown admin policy: {other}")),
        }
    }
}

/// Result of one membership command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MembershipOutcome {
    /// The data store accepted `config`.
    Applied {
        config: ReplicaSetConfig,
        result: CommandResult,
    },
    /// The command was rejected or its reply could not be read.
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        config: Option<ReplicaSetConfig>,
        reason: String,
    },
}

impl MembershipOutcome {
    /// Returns true if the data store accepted the command.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Configuration submitted, if one was built.
    pub fn config(&self) -> Option<&ReplicaSetConfig> {
        match self {
            Self::Applied { config, .. } => Some(config),
            Self::Rejected { config, .. } => config.as_ref(),
        }
    }
}

/// Applies initiate/join to data nodes under an [`AdminPolicy`].
#[derive(Clone)]
pub struct MembershipCoordinator {
    channel: Arc<dyn AdminChannel>,
    policy: AdminPolicy,
    cluster_id: String,
}

impl MembershipCoordinator {
    /// Creates a coordinator for the replica set named `cluster_id`.
    pub fn new(channel: Arc<dyn AdminChannel>, cluster_id: impl Into<String>, policy: AdminPolicy) -> Self {
        Self {
            channel,
            policy,
            cluster_id: cluster_id.into(),
        }
    }

    pub fn policy(&self) -> AdminPolicy {
        self.policy
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    /// Initiates a single-member set on `node`.
    pub async fn initiate(&self, node: &DataNode) -> Result<MembershipOutcome> {
        let address = node.require_address()?;
        let reply = node.init_set(self.channel.as_ref(), &self.cluster_id).await;
        self.settle("initiate", address, reply)
    }

    /// Adds `node` to the set whose primary is at `primary`.
    pub async fn join(&self, node: &DataNode, primary: &str) -> Result<MembershipOutcome> {
        node.require_address()?;
        let reply = node.join_cluster(self.channel.as_ref(), primary).await;
        self.settle("reconfigure", primary, reply)
    }

    fn settle(
        &self,
        operation: &'static str,
        target: &str,
        reply: Result<Submission>,
    ) -> Result<MembershipOutcome> {
        match reply {
            Ok(Submission { config, result }) if result.is_ok() => {
                Ok(MembershipOutcome::Applied { config, result })
            }
            Ok(Submission { config, result }) => self.settle_failure(
                operation,
                target,
                Some(config),
                Error::admin(operation, target, result.reason()),
            ),
            Err(e) => self.settle_failure(operation, target, None, e),
        }
    }

    fn settle_failure(
        &self,
        operation: &'static str,
        target: &str,
        config: Option<ReplicaSetConfig>,
        error: Error,
    ) -> Result<MembershipOutcome> {
        let from_data_store = matches!(error, Error::Administrative { .. } | Error::Timeout { .. });
        if !from_data_store || self.policy == AdminPolicy::FailFast {
            return Err(error);
        }
        warn!(%target, "{} not applied, continuing: {}", operation, error);
        Ok(MembershipOutcome::Rejected {
            config,
            reason: error.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!("advisory".parse::<AdminPolicy>(), Ok(AdminPolicy::Advisory));
        assert_eq!("Fail-Fast".parse::<AdminPolicy>(), Ok(AdminPolicy::FailFast));
        assert!("strict".parse::<AdminPolicy>().is_err());
        assert_eq!(AdminPolicy::default(), AdminPolicy::Advisory);
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = MembershipOutcome::Rejected {
            config: None,
            reason: "nope".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "nope");
        assert!(json.get("config").is_none());
        assert!(!outcome.is_applied());
    }
}
