use crate::error::RemoteError;
use crate::utils::cap_bytes;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Maximum captured output per stream (1 MB).
const MAX_OUTPUT_BYTES: usize = 1_048_576;

pub(super) struct RawOutput {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Spawn `cmd`, feed `stdin_payload`, and wait for it while racing `cancel`
/// and `timeout`. The child is killed when either wins.
pub(super) async fn run_child(
    mut cmd: Command,
    stdin_payload: Option<String>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<RawOutput, RemoteError> {
    if cancel.is_cancelled() {
        return Err(RemoteError::Cancelled);
    }

    cmd.stdin(if stdin_payload.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| RemoteError::Exec(format!("failed to spawn process: {e}")))?;

    if let Some(payload) = stdin_payload {
        if let Some(mut stdin) = child.stdin.take() {
            // The child may exit before reading; a broken pipe here is not fatal.
            if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                tracing::debug!("stdin write failed: {e}");
            }
            drop(stdin);
        }
    }

    // Dropping the wait future drops the child, and kill_on_drop reaps it.
    let output = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::warn!("cancellation requested, killing in-flight command");
            return Err(RemoteError::Cancelled);
        }
        result = tokio::time::timeout(timeout, child.wait_with_output()) => match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(RemoteError::Exec(format!("failed to wait for process: {e}"))),
            Err(_) => return Err(RemoteError::Timeout(timeout.as_secs())),
        },
    };

    Ok(RawOutput {
        code: output.status.code(),
        stdout: cap_bytes(
            String::from_utf8_lossy(&output.stdout).into_owned(),
            MAX_OUTPUT_BYTES,
            "\n... [output truncated at 1MB]",
        ),
        stderr: cap_bytes(
            String::from_utf8_lossy(&output.stderr).into_owned(),
            MAX_OUTPUT_BYTES,
            "\n... [stderr truncated at 1MB]",
        ),
    })
}
