//! # Administrative Channel
//!
//! Out-of-band control path to a data-store instance. The membership
//! protocol only needs three named operations:
//!
//! | Operation      | Data-store command              | Target              |
//! |----------------|---------------------------------|---------------------|
//! | `initiate`     | `replSetInitiate: <config>`     | `<self>/admin`      |
//! | `fetch_config` | `rs.conf()`                     | `<primary>`         |
//! | `reconfigure`  | `replSetReconfig: <config>`     | `<primary>/admin`   |
//!
//! [`AdminChannel`] is the seam: today it is implemented by
//! [`ScriptChannel`], which writes a shell script and runs it through the
//! `mongo` binary. A native wire-protocol client can replace it without
//! touching [`crate::membership`].
//!
//! ## Configuration Document
//!
//! ```json
//! {"_id": "rs0", "members": [{"_id": 0, "host": "10.0.0.1"}], "version": 1}
//! ```
//!
//! `version` is omitted from the initial document; the data store assigns 1.

pub mod script;

pub use self::script::{MongoShell, ScriptChannel, ScriptExecutor};

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// =============================================================================
// Configuration Document
// =============================================================================

/// One member of a replica-set configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaMember {
    /// Member ID, unique within the set.
    #[serde(rename = "_id")]
    pub id: u32,
    /// Network address of the member.
    pub host: String,
}

/// Versioned replica-set configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaSetConfig {
    /// Replica-set name.
    #[serde(rename = "_id")]
    pub cluster_id: String,
    /// Ordered member list.
    #[serde(default)]
    pub members: Vec<ReplicaMember>,
    /// Configuration version; absent before the set is initiated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl ReplicaSetConfig {
    /// Builds the single-member document used to initiate a set.
    pub fn initial(cluster_id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            members: vec![ReplicaMember {
                id: 0,
                host: host.into(),
            }],
            version: None,
        }
    }

    /// Returns the next document with `host` appended.
    ///
    /// The new member's ID is the current member count and the version is
    /// bumped by one (an absent version counts as 0).
    #[must_use]
    pub fn with_member(&self, host: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.members.push(ReplicaMember {
            id: next.members.len() as u32,
            host: host.into(),
        });
        next.version = Some(self.version.unwrap_or(0) + 1);
        next
    }

    /// Returns true if some member is reachable at `host`.
    pub fn contains_host(&self, host: &str) -> bool {
        self.members.iter().any(|m| m.host == host)
    }

    /// Returns true if no two members share an ID.
    pub fn has_unique_ids(&self) -> bool {
        let mut ids: Vec<u32> = self.members.iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.windows(2).all(|w| w[0] != w[1])
    }
}

// =============================================================================
// Command Result
// =============================================================================

/// Decoded reply of an administrative command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// 1 on success, 0 on failure.
    #[serde(default)]
    pub ok: f64,
    /// Failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errmsg: Option<String>,
    /// Failure code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info2: Option<String>,
    /// Address the responding node believes it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub me: Option<String>,
}

impl CommandResult {
    /// A successful reply.
    pub fn success() -> Self {
        Self {
            ok: 1.0,
            ..Self::default()
        }
    }

    /// A failed reply with `errmsg`.
    pub fn failure(errmsg: impl Into<String>) -> Self {
        Self {
            ok: 0.0,
            errmsg: Some(errmsg.into()),
            ..Self::default()
        }
    }

    /// Returns true if the data store accepted the command.
    pub fn is_ok(&self) -> bool {
        self.ok == 1.0
    }

    /// Best available description of a failure.
    pub fn reason(&self) -> String {
        self.errmsg
            .clone()
            .or_else(|| self.info.clone())
            .unwrap_or_else(|| format!("ok={}", self.ok))
    }
}

// =============================================================================
// Channel Trait
// =============================================================================

/// Named administrative operations against a data-store instance.
///
/// Implementations report transport and decode failures as
/// [`Error::Administrative`](crate::error::Error::Administrative). A command
/// the data store rejects is NOT an error here; it comes back as a
/// [`CommandResult`] with `ok == 0` and the caller's policy decides.
#[async_trait]
pub trait AdminChannel: Send + Sync {
    /// Initiates a replica set on `target` with `config`.
    async fn initiate(&self, target: &str, config: &ReplicaSetConfig) -> Result<CommandResult>;

    /// Reads the current configuration document from `target`.
    async fn fetch_config(&self, target: &str) -> Result<ReplicaSetConfig>;

    /// Replaces the configuration on `target`.
    async fn reconfigure(
        &self,
        target: &str,
        config: &ReplicaSetConfig,
        force: bool,
    ) -> Result<CommandResult>;
}
