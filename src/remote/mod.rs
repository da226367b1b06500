//! Remote command channel used for monitoring, verification and execution.

mod local;
mod process;
mod ssh;

pub use local::LocalChannel;
pub use ssh::SshChannel;

use crate::config::{RemoteConfig, RemoteKind};
use crate::error::RemoteError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Exit code and captured output of one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub type RemoteFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, RemoteError>> + Send + 'a>>;

/// Runs shell commands on the managed host.
///
/// Implementations wait for completion while watching `cancel`; a cancelled
/// token kills the in-flight command and yields [`RemoteError::Cancelled`].
pub trait RemoteChannel: Send + Sync {
    /// Human-readable target, used in logs and connectivity errors.
    fn target(&self) -> String;

    /// Run `command`, with `use_sudo` supplying the stored credential to sudo.
    fn execute<'a>(
        &'a self,
        command: &'a str,
        use_sudo: bool,
        cancel: &'a CancellationToken,
    ) -> RemoteFuture<'a>;
}

/// Build the channel selected by `[remote] kind`.
pub fn create_channel(config: &RemoteConfig) -> Arc<dyn RemoteChannel> {
    match config.kind {
        RemoteKind::Ssh => Arc::new(SshChannel::from_config(config)),
        RemoteKind::Local => Arc::new(LocalChannel::from_config(config)),
    }
}

/// Drop the echoed `[sudo] password for ...` line sudo may print first.
pub(crate) fn strip_sudo_prompt(stdout: &str) -> String {
    let trimmed = stdout.trim();
    if trimmed.starts_with("[sudo]") {
        trimmed
            .split_once('\n')
            .map(|(_, rest)| rest.trim().to_string())
            .unwrap_or_default()
    } else {
        trimmed.to_string()
    }
}
