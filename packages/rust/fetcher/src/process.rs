//! Bounded subprocess execution.
//!
//! Every external tool (git, python, pip) runs through [`run_checked`], which
//! enforces a deadline and kills the child when it expires.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use docsmith_shared::{DocsetError, Result};
use tokio::process::Command;
use tracing::debug;

/// Keep at most this many trailing bytes of stderr in error messages.
const STDERR_TAIL: usize = 2000;

/// Build a command with stdin closed and both output streams captured.
///
/// The child is killed if the returned command's future is dropped, which is
/// how timeouts (ours or an enclosing one) stop it.
pub fn command(program: &str, cwd: Option<&Path>) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd
}

/// Run `cmd` to completion within `timeout`, returning its stdout.
///
/// A non-zero exit becomes [`DocsetError::Process`] carrying the tail of
/// stderr. Expiry becomes [`DocsetError::Timeout`].
pub async fn run_checked(mut cmd: Command, label: &str, timeout: Duration) -> Result<String> {
    debug!(command = label, timeout_secs = timeout.as_secs(), "running");

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(DocsetError::process(label, format!("failed to start: {e}")));
        }
        Err(_) => return Err(DocsetError::timeout(label, timeout.as_secs())),
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let tail = if stderr.len() > STDERR_TAIL {
            let mut start = stderr.len() - STDERR_TAIL;
            while !stderr.is_char_boundary(start) {
                start += 1;
            }
            &stderr[start..]
        } else {
            stderr
        };
        return Err(DocsetError::process(
            label,
            format!("exited with {}: {tail}", output.status),
        ));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
