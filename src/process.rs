//! Subprocess execution and stderr classification.
//!
//! gphoto2 reports errors as banner-formatted text on stderr, and reports
//! some perfectly expected camera states (such as a failed autofocus hunt) as
//! process failures. The runner buffers both output streams, extracts a
//! short human-readable message from the known banner shapes, silently
//! resolves the allow-listed recoverable states, and offers everything else
//! to an optionally registered [`ErrorPolicy`].
//!
//! No timeout is enforced here: some gphoto2 commands are legitimately
//! long-running (bulb exposures), so a hung binary hangs the calling future.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::debug;

use crate::error::{GPhotoError, Result};

/// Short messages that gphoto2 reports as failures but which are expected,
/// recoverable camera states. Matched case-insensitively against the
/// extracted short message; a match resolves to empty output.
const IGNORABLE_ERRORS: &[&str] = &["out of focus"];

/// Outcome of classifying a command failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Treat the failure as success with empty output.
    Resolve,
    /// Propagate the failure as an error.
    Reject,
}

/// Pluggable policy consulted when a gphoto2 invocation fails.
///
/// Receives the extracted short message and the full stderr text. Returning
/// [`Outcome::Resolve`] converts the failure into an empty-output success;
/// [`Outcome::Reject`] lets it propagate.
#[async_trait]
pub trait ErrorPolicy: Send + Sync {
    async fn classify(&self, short: &str, stderr: &str) -> Outcome;
}

/// Shared, swappable slot for the registered error policy. Cloned into the
/// liveview controller so stream failures route through the same policy.
pub(crate) type PolicyCell = Arc<RwLock<Option<Arc<dyn ErrorPolicy>>>>;

/// Extract a short human-readable error from gphoto2 stderr.
///
/// Patterns are tried in priority order; returns the empty string when none
/// match. Lines are split on both `\n` and `\r`, trimmed, blanks dropped.
pub(crate) fn parse_short_error(stderr: &str) -> String {
    let lines: Vec<&str> =
        stderr.split(['\n', '\r']).map(str::trim).filter(|s| !s.is_empty()).collect();

    // Boxed banner: the message is on the line after "*** Error ***".
    if let Some(idx) = lines.iter().position(|l| l.starts_with("*** Error ***")) {
        return lines.get(idx + 1).copied().unwrap_or_default().to_string();
    }

    // Banner with parenthesized detail: "*** Error (-5: 'Unknown port') ***".
    if let Some(line) = lines.iter().find(|l| l.starts_with("*** Error (")) {
        if let Some(detail) =
            line.strip_prefix("*** Error (").and_then(|rest| rest.strip_suffix(") ***"))
        {
            return detail.to_string();
        }
        return (*line).to_string();
    }

    // Inline form: "*** Error: detail ***".
    if let Some(line) = lines.iter().find(|l| l.starts_with("*** Error:")) {
        if let Some(detail) =
            line.strip_prefix("*** Error: ").and_then(|rest| rest.strip_suffix(" ***"))
        {
            return detail.to_string();
        }
        return (*line).to_string();
    }

    if lines.iter().any(|l| l.to_lowercase().contains("connection reset by peer")) {
        return "Connection reset by peer".to_string();
    }

    if let Some(line) = lines.iter().find(|l| l.to_lowercase().starts_with("error")) {
        return (*line).to_string();
    }

    String::new()
}

/// Spawn a command line through the shell with stderr captured and stdout
/// discarded. Used by the liveview controller, which owns the child's
/// lifecycle and kills it on `stop()`.
///
/// The child gets its own process group: the command line is a pipeline, and
/// killing only the `sh` wrapper would orphan the pipeline's children with
/// the camera and listen port still held. Teardown signals the whole group.
pub(crate) fn spawn_shell(cmd: &str) -> Result<Child> {
    Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| GPhotoError::Spawn { command: cmd.to_string(), source })
}

/// Executes gphoto2 command lines and classifies their failures.
pub(crate) struct Runner {
    binary: String,
    policy: PolicyCell,
}

impl Runner {
    pub(crate) fn new(binary: String, policy: PolicyCell) -> Self {
        Self { binary, policy }
    }

    /// The gphoto2 executable name used as the head of every command line.
    pub(crate) fn binary(&self) -> &str {
        &self.binary
    }

    pub(crate) fn policy_cell(&self) -> PolicyCell {
        Arc::clone(&self.policy)
    }

    fn current_policy(&self) -> Option<Arc<dyn ErrorPolicy>> {
        self.policy.read().expect("policy lock poisoned").clone()
    }

    /// Run a command line to completion and return its stdout.
    ///
    /// On non-zero exit the stderr is classified: allow-listed short messages
    /// resolve to empty output, then (when `report_errors` is set) the
    /// registered policy gets the final say; otherwise the failure propagates
    /// carrying the short message.
    pub(crate) async fn run(
        &self,
        cmd: &str,
        cwd: Option<&Path>,
        report_errors: bool,
    ) -> Result<String> {
        debug!(command = %cmd, "running gphoto2 command");

        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd).stdin(Stdio::null());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let output = command
            .output()
            .await
            .map_err(|source| GPhotoError::Spawn { command: cmd.to_string(), source })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let short = parse_short_error(&stderr);
        debug!(short = %short, "gphoto2 command failed");

        if IGNORABLE_ERRORS.contains(&short.to_lowercase().as_str()) {
            return Ok(String::new());
        }

        if report_errors {
            if let Some(policy) = self.current_policy() {
                match policy.classify(&short, &stderr).await {
                    Outcome::Resolve => return Ok(String::new()),
                    Outcome::Reject => {}
                }
            }
        }

        Err(GPhotoError::command_failed(short, stderr))
    }
}
