//! # Control-Plane Constants
//!
//! Defaults for the container template, the administrative channel, and
//! every timeout or retry bound used by the control plane. These constants
//! are the single source of truth; configuration builders start from them.
//!
//! ## Cross-References
//!
//! - [`crate::registry`]: Uses the container template for new instances
//! - [`crate::instance`]: Uses connect backoff bounds and the data-store port
//! - [`crate::admin`]: Uses the shell binary and command timeout
//! - [`crate::runtimes`]: Uses the runtime command timeout

use std::time::Duration;

// =============================================================================
// Container Template
// =============================================================================
//
// Every instance created by the control plane is started from the same image
// with the same replica-set arguments. The replica-set name in the arguments
// must match `DEFAULT_REPLICA_SET_ID` or `replSetInitiate` is rejected.
// =============================================================================

/// Image used for data-store containers.
pub const DEFAULT_IMAGE: &str = "asangpet/mongodb";

/// Replica-set identifier written into every configuration document.
pub const DEFAULT_REPLICA_SET_ID: &str = "rs0";

/// Command arguments passed to the image entrypoint.
///
/// Small oplog and files keep test clusters cheap to start.
pub const DEFAULT_CONTAINER_ARGS: &[&str] = &["--replSet", "rs0", "--smallfiles", "--oplogSize", "16"];

/// Port the data store listens on inside its container.
pub const DATA_STORE_PORT: u16 = 27017;

// =============================================================================
// Connection Bounds
// =============================================================================
//
// A freshly started mongod needs a few seconds before it accepts connections.
// Dialing retries with exponential backoff, capped per attempt and bounded by
// an overall deadline so a dead container surfaces as an error.
// =============================================================================

/// First delay between dial attempts.
pub const CONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Ceiling for a single backoff delay.
pub const CONNECT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Overall deadline for reaching a new instance.
pub const CONNECT_DEADLINE: Duration = Duration::from_secs(60);

/// Timeout applied to each individual dial.
pub const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(3);

// =============================================================================
// External Commands
// =============================================================================

/// Container runtime CLI binary.
pub const DOCKER_BINARY: &str = "docker";

/// Data-store shell binary used as the administrative channel.
pub const MONGO_SHELL_BINARY: &str = "mongo";

/// Timeout for a single container runtime command.
pub const RUNTIME_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout for a single administrative command.
///
/// `replSetInitiate` and `replSetReconfig` can take several seconds while
/// the set elects a primary.
pub const ADMIN_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Maximum bytes of command output retained for decoding.
pub const MAX_COMMAND_OUTPUT: usize = 1024 * 1024;

// =============================================================================
// Instance Names
// =============================================================================

/// Valid characters for instance names (Docker's container-name set).
pub const INSTANCE_NAME_VALID_CHARS: &str =
    "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_.";

/// Maximum instance name length.
pub const MAX_INSTANCE_NAME_LEN: usize = 128;

/// Validates an instance name supplied by a caller.
///
/// # Returns
///
/// `Ok(())` if valid, `Err(reason)` with a description of the failure.
#[inline]
#[must_use = "validation result must be checked before the name reaches the runtime"]
pub fn validate_instance_name(name: &str) -> std::result::Result<(), &'static str> {
    if name.is_empty() {
        return Err("instance name cannot be empty");
    }
    if name.len() > MAX_INSTANCE_NAME_LEN {
        return Err("instance name exceeds maximum length");
    }
    if !name.chars().all(|c| INSTANCE_NAME_VALID_CHARS.contains(c)) {
        return Err("instance name contains invalid characters");
    }
    if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err("instance name must start with an alphanumeric character");
    }
    Ok(())
}
