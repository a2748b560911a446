//! Tests for constants module.
//!
//! Validates that defaults agree with each other and that retry bounds
//! are ordered sensibly.

use replctl::constants::*;
use std::time::Duration;

// =============================================================================
// Container Template Tests
// =============================================================================

#[test]
fn test_container_args_name_the_default_replica_set() {
    let pos = DEFAULT_CONTAINER_ARGS
        .iter()
        .position(|a| *a == "--replSet")
        .expect("template must start mongod as a replica-set member");
    assert_eq!(
        DEFAULT_CONTAINER_ARGS[pos + 1],
        DEFAULT_REPLICA_SET_ID,
        "replSetInitiate is rejected when the set names differ"
    );
}

#[test]
fn test_data_store_port() {
    assert_eq!(DATA_STORE_PORT, 27017);
}

// =============================================================================
// Connection Bound Tests
// =============================================================================

#[test]
fn test_backoff_bounds_ordered() {
    assert!(CONNECT_INITIAL_BACKOFF > Duration::ZERO);
    assert!(CONNECT_INITIAL_BACKOFF <= CONNECT_MAX_BACKOFF);
    assert!(
        CONNECT_MAX_BACKOFF < CONNECT_DEADLINE,
        "a single delay must not consume the whole deadline"
    );
}

#[test]
fn test_attempt_timeout_fits_deadline() {
    assert!(CONNECT_ATTEMPT_TIMEOUT < CONNECT_DEADLINE);
    // mongod typically needs a few seconds to accept connections
    assert!(CONNECT_DEADLINE >= Duration::from_secs(10));
}

#[test]
fn test_command_timeouts_reasonable() {
    assert!(ADMIN_COMMAND_TIMEOUT >= Duration::from_secs(10));
    assert!(RUNTIME_COMMAND_TIMEOUT >= ADMIN_COMMAND_TIMEOUT);
    assert!(MAX_COMMAND_OUTPUT >= 64 * 1024, "rs.conf() output can be large");
}

// =============================================================================
// Instance Name Validation Tests
// =============================================================================

#[test]
fn test_valid_names() {
    assert!(validate_instance_name("alpha").is_ok());
    assert!(validate_instance_name("eager_turing").is_ok());
    assert!(validate_instance_name("node-42").is_ok());
    assert!(validate_instance_name("my.db").is_ok());
    assert!(validate_instance_name(&"a".repeat(MAX_INSTANCE_NAME_LEN)).is_ok());
}

#[test]
fn test_invalid_names() {
    assert!(validate_instance_name("").is_err());
    assert!(validate_instance_name(&"a".repeat(MAX_INSTANCE_NAME_LEN + 1)).is_err());
    assert!(validate_instance_name("../etc").is_err());
    assert!(validate_instance_name("has space").is_err());
    assert!(validate_instance_name("-leading").is_err());
    assert!(validate_instance_name("_leading").is_err());
    assert!(validate_instance_name(".hidden").is_err());
}

#[test]
fn test_name_chars_match_docker() {
    for c in INSTANCE_NAME_VALID_CHARS.chars() {
        assert!(
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'),
            "unexpected char {c:?}"
        );
    }
    assert!(!INSTANCE_NAME_VALID_CHARS.contains('/'));
}
