use super::process::run_child;
use super::{CommandOutput, RemoteChannel, RemoteFuture, strip_sudo_prompt};
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Environment variables safe to pass to shell commands.
/// Only functional variables are included -- never API keys or secrets.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "SHELL",
];

/// Runs commands with `sh -c` on the controller host itself.
pub struct LocalChannel {
    sudo_password: Option<String>,
    command_timeout: Duration,
}

impl LocalChannel {
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            sudo_password: None,
            command_timeout,
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            sudo_password: config.password.clone(),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    fn build_command(&self, command: &str, use_sudo: bool) -> Command {
        let mut cmd = if use_sudo {
            let mut cmd = Command::new("sudo");
            if self.sudo_password.is_some() {
                cmd.args(["-S", "-p", ""]);
            } else {
                cmd.arg("-n");
            }
            cmd.args(["--", "sh", "-c", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            cmd
        };

        // Clear the environment so secrets never reach managed commands,
        // then re-add only safe, functional variables.
        cmd.env_clear();
        for var in SAFE_ENV_VARS {
            if let Ok(val) = std::env::var(var) {
                cmd.env(var, val);
            }
        }
        cmd
    }
}

impl RemoteChannel for LocalChannel {
    fn target(&self) -> String {
        "local".into()
    }

    fn execute<'a>(
        &'a self,
        command: &'a str,
        use_sudo: bool,
        cancel: &'a CancellationToken,
    ) -> RemoteFuture<'a> {
        Box::pin(async move {
            tracing::info!(sudo = use_sudo, "executing locally: {command}");

            let stdin_payload = if use_sudo {
                self.sudo_password.as_ref().map(|p| format!("{p}\n"))
            } else {
                None
            };

            let raw = run_child(
                self.build_command(command, use_sudo),
                stdin_payload,
                self.command_timeout,
                cancel,
            )
            .await?;

            let Some(exit_code) = raw.code else {
                return Err(RemoteError::Exec("command terminated by signal".into()));
            };

            let stdout = if use_sudo {
                strip_sudo_prompt(&raw.stdout)
            } else {
                raw.stdout.trim().to_string()
            };
            Ok(CommandOutput::new(exit_code, stdout, raw.stderr.trim()))
        })
    }
}
