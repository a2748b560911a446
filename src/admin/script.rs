//! Script-file administrative channel.
//!
//! Each call writes a one-line shell script to a uniquely named temporary
//! file, hands the target address and the script path to a
//! [`ScriptExecutor`], decodes the first JSON document of the output and
//! deletes the script.
//!
//! ## Script Files
//!
//! ```text
//! <scratch>/initRepl.<addr>.<random>.js    print(tojson(db.runCommand({replSetInitiate:{...}})))
//! <scratch>/getRepl.<addr>.<random>.js     print(tojson(rs.conf()))
//! <scratch>/reconfRepl.<addr>.<random>.js  print(tojson(db.runCommand({replSetReconfig:{...},force:false})))
//! ```
//!
//! The random component keeps concurrent calls against the same target from
//! sharing a file. Deletion is tied to the temp-file guard, so it runs on
//! every return path including errors. A process crash can leave files
//! behind in the scratch directory.
//!
//! ## Reply Format
//!
//! `tojson` prints the shell's relaxed notation. Plain command replies and
//! `rs.conf()` documents from servers before 3.0 are valid JSON. Newer
//! servers add `settings.replicaSetId` as `ObjectId("...")` and replies
//! carry `Timestamp(...)` fields, which no JSON decoder accepts. Such a
//! reply fails with an administrative error naming the shell type; printing
//! through `JSON.stringify` instead of `tojson` would lift this limit.

use super::{AdminChannel, CommandResult, ReplicaSetConfig};
use crate::constants::{ADMIN_COMMAND_TIMEOUT, MAX_COMMAND_OUTPUT, MONGO_SHELL_BINARY};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

// =============================================================================
// Executor
// =============================================================================

/// Runs a script file against a data-store target and returns raw output.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Executes `script` against `target` (`host[:port][/db]`).
    async fn execute(&self, target: &str, script: &Path) -> Result<Vec<u8>>;
}

/// Executor backed by the `mongo` shell.
///
/// Runs `mongo --quiet <target> <script>`.
#[derive(Debug, Clone)]
pub struct MongoShell {
    binary: PathBuf,
    timeout: Duration,
}

impl MongoShell {
    /// Creates an executor using `mongo` from `PATH`.
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from(MONGO_SHELL_BINARY),
            timeout: ADMIN_COMMAND_TIMEOUT,
        }
    }

    /// Uses a specific shell binary.
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Sets the per-command timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for MongoShell {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptExecutor for MongoShell {
    async fn execute(&self, target: &str, script: &Path) -> Result<Vec<u8>> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--quiet").arg(target).arg(script);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout {
                operation: format!("{} {}", self.binary.display(), target),
                duration: self.timeout,
            })?
            .map_err(|e| Error::admin("execute", target, e))?;

        if !output.status.success() {
            // The shell prints connection failures on stdout.
            let mut detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if detail.is_empty() {
                detail = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            return Err(Error::admin(
                "execute",
                target,
                format!("{} ({})", detail, output.status),
            ));
        }

        Ok(cap_output(target, output.stdout))
    }
}

/// Limits shell output to `MAX_COMMAND_OUTPUT` bytes.
fn cap_output(target: &str, mut stdout: Vec<u8>) -> Vec<u8> {
    if stdout.len() > MAX_COMMAND_OUTPUT {
        warn!("mongo {} output truncated to {} bytes", target, MAX_COMMAND_OUTPUT);
        stdout.truncate(MAX_COMMAND_OUTPUT);
    }
    stdout
}

// =============================================================================
// Channel
// =============================================================================

/// [`AdminChannel`] that drives the data store through script files.
#[derive(Debug, Clone)]
pub struct ScriptChannel<E> {
    executor: E,
    scratch_dir: PathBuf,
}

impl<E: ScriptExecutor> ScriptChannel<E> {
    /// Creates a channel writing scripts to the system temp directory.
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            scratch_dir: std::env::temp_dir(),
        }
    }

    /// Writes scripts into `dir` instead of the system temp directory.
    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    /// Returns the directory scripts are written to.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Returns the wrapped executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Writes `body` to a fresh script file, runs it, decodes one document.
    async fn run<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        prefix: &str,
        address: &str,
        target: &str,
        body: &str,
    ) -> Result<T> {
        let mut script = tempfile::Builder::new()
            .prefix(&format!("{}.{}.", prefix, file_fragment(address)))
            .suffix(".js")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| Error::admin(operation, target, format!("cannot create script: {e}")))?;
        script.write_all(body.as_bytes())?;
        script.flush()?;

        debug!(script = %script.path().display(), %target, "running {}", operation);
        let output = self.executor.execute(target, script.path()).await;

        let path = script.path().to_path_buf();
        if let Err(e) = script.close() {
            warn!("failed to remove script {}: {}", path.display(), e);
        }

        let output = output?;
        debug!(%target, "{} output: {}", operation, String::from_utf8_lossy(&output).trim());
        decode_document(operation, target, &output)
    }
}

#[async_trait]
impl<E: ScriptExecutor> AdminChannel for ScriptChannel<E> {
    async fn initiate(&self, target: &str, config: &ReplicaSetConfig) -> Result<CommandResult> {
        let body = initiate_script(config)?;
        self.run("initiate", "initRepl", target, &admin_db(target), &body)
            .await
    }

    async fn fetch_config(&self, target: &str) -> Result<ReplicaSetConfig> {
        self.run("fetch_config", "getRepl", target, target, FETCH_CONFIG_SCRIPT)
            .await
    }

    async fn reconfigure(
        &self,
        target: &str,
        config: &ReplicaSetConfig,
        force: bool,
    ) -> Result<CommandResult> {
        let body = reconfigure_script(config, force)?;
        self.run("reconfigure", "reconfRepl", target, &admin_db(target), &body)
            .await
    }
}

// =============================================================================
// Script Bodies
// =============================================================================

const FETCH_CONFIG_SCRIPT: &str = "print(tojson(rs.conf()))";

/// Script body for `replSetInitiate`.
pub fn initiate_script(config: &ReplicaSetConfig) -> Result<String> {
    let payload = serde_json::to_string(config)?;
    Ok(format!(
        "print(tojson(db.runCommand({{replSetInitiate:{payload}}})))"
    ))
}

/// Script body for `replSetReconfig`.
pub fn reconfigure_script(config: &ReplicaSetConfig, force: bool) -> Result<String> {
    let payload = serde_json::to_string(config)?;
    Ok(format!(
        "print(tojson(db.runCommand({{replSetReconfig:{payload},force:{force}}})))"
    ))
}

fn admin_db(address: &str) -> String {
    format!("{address}/admin")
}

/// Reduces an address to characters safe in a file name.
fn file_fragment(address: &str) -> String {
    address
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Decodes the first JSON document in `raw`, ignoring anything after it.
fn decode_document<T: DeserializeOwned>(
    operation: &'static str,
    target: &str,
    raw: &[u8],
) -> Result<T> {
    let mut documents = serde_json::Deserializer::from_slice(raw).into_iter::<T>();
    match documents.next() {
        Some(Ok(doc)) => Ok(doc),
        Some(Err(e)) => {
            let reason = match shell_type_in(raw) {
                Some(kind) => format!("reply contains shell type {kind}(...), not JSON: {e}"),
                None => format!("undecodable reply: {e}"),
            };
            Err(Error::admin(operation, target, reason))
        }
        None => Err(Error::admin(operation, target, "empty reply")),
    }
}

/// Shell constructors `tojson` emits in place of JSON values.
const SHELL_TYPES: &[&str] = &[
    "ObjectId",
    "Timestamp",
    "ISODate",
    "NumberLong",
    "NumberDecimal",
    "BinData",
];

fn shell_type_in(raw: &[u8]) -> Option<&'static str> {
    let text = String::from_utf8_lossy(raw);
    SHELL_TYPES
        .iter()
        .copied()
        .find(|kind| text.contains(&format!("{kind}(")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_script_body() {
        let body = initiate_script(&ReplicaSetConfig::initial("rs0", "10.0.0.1")).unwrap();
        assert_eq!(
            body,
            r#"print(tojson(db.runCommand({replSetInitiate:{"_id":"rs0","members":[{"_id":0,"host":"10.0.0.1"}]}})))"#
        );
    }

    #[test]
    fn test_reconfigure_script_body() {
        let config = ReplicaSetConfig::initial("rs0", "a").with_member("b");
        let body = reconfigure_script(&config, false).unwrap();
        assert!(body.starts_with("print(tojson(db.runCommand({replSetReconfig:{"));
        assert!(body.ends_with(",force:false})))"));
        assert!(body.contains(r#""version":1"#));
    }

    #[test]
    fn test_file_fragment() {
        assert_eq!(file_fragment("10.0.0.1"), "10.0.0.1");
        assert_eq!(file_fragment("10.0.0.1:27017/admin"), "10.0.0.1_27017_admin");
    }

    #[test]
    fn test_decode_first_document_only() {
        let raw = b"{\"ok\":1}\n{\"ok\":0}\n";
        let res: CommandResult = decode_document("initiate", "x", raw).unwrap();
        assert!(res.is_ok());
    }

    #[test]
    fn test_decode_multiline_document() {
        let raw = b"{\n\t\"ok\" : 0,\n\t\"errmsg\" : \"no\"\n}\n";
        let res: CommandResult = decode_document("initiate", "x", raw).unwrap();
        assert_eq!(res.errmsg.as_deref(), Some("no"));
    }

    #[test]
    fn test_decode_empty_reply() {
        let err = decode_document::<CommandResult>("initiate", "x", b"  \n").unwrap_err();
        assert!(err.is_administrative());
    }

    #[test]
    fn test_decode_garbage_reply() {
        let err = decode_document::<ReplicaSetConfig>("fetch_config", "x", b"null").unwrap_err();
        assert!(err.is_administrative());
        assert!(err.to_string().contains("undecodable reply"));
    }

    #[test]
    fn test_decode_names_shell_type() {
        let raw = br#"{
	"_id" : "rs0",
	"version" : 1,
	"members" : [ { "_id" : 0, "host" : "10.0.0.1:27017" } ],
	"settings" : { "replicaSetId" : ObjectId("5f1c0a4e9d3b2a0011223344") }
}"#;
        let err = decode_document::<ReplicaSetConfig>("fetch_config", "x", raw).unwrap_err();
        assert!(err.is_administrative());
        assert!(err.to_string().contains("ObjectId"), "{err}");
    }

    #[test]
    fn test_shell_type_detection() {
        assert_eq!(shell_type_in(br#"{"ts" : Timestamp(1600000000, 1)}"#), Some("Timestamp"));
        assert_eq!(shell_type_in(br#"{"note":"ObjectId is a word"}"#), None);
    }

    #[test]
    fn test_oversized_output_is_capped() {
        let big = vec![b'x'; MAX_COMMAND_OUTPUT + 10];
        assert_eq!(cap_output("10.0.0.1/admin", big).len(), MAX_COMMAND_OUTPUT);

        let small = b"{\"ok\":1}".to_vec();
        assert_eq!(cap_output("10.0.0.1/admin", small.clone()), small);
    }
}
