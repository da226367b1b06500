use super::process::run_child;
use super::{CommandOutput, RemoteChannel, RemoteFuture, strip_sudo_prompt};
use crate::config::RemoteConfig;
use crate::error::RemoteError;
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Exit status the OpenSSH client reserves for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// Remote channel backed by the system OpenSSH client.
///
/// Authentication is key based (`BatchMode=yes`); the configured password is
/// only ever used as the sudo credential, written to `sudo -S` on stdin.
pub struct SshChannel {
    host: String,
    port: u16,
    user: String,
    sudo_password: Option<String>,
    identity_file: Option<PathBuf>,
    connect_timeout_secs: u64,
    command_timeout: Duration,
}

impl SshChannel {
    pub fn from_config(config: &RemoteConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            sudo_password: config.password.clone(),
            identity_file: config.identity_file.clone(),
            connect_timeout_secs: config.connect_timeout_secs,
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn remote_command(&self, command: &str, use_sudo: bool) -> String {
        if !use_sudo {
            return command.to_string();
        }
        if self.sudo_password.is_some() {
            format!("sudo -S -p '' {command}")
        } else {
            format!("sudo -n {command}")
        }
    }

    fn build_command(&self, remote_command: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={}", self.connect_timeout_secs))
            .arg("-o")
            .arg("StrictHostKeyChecking=accept-new")
            .arg("-p")
            .arg(self.port.to_string());
        if let Some(identity) = &self.identity_file {
            cmd.arg("-i").arg(identity);
        }
        cmd.arg(self.destination()).arg("--").arg(remote_command);
        cmd
    }
}

impl RemoteChannel for SshChannel {
    fn target(&self) -> String {
        format!("{}:{}", self.destination(), self.port)
    }

    fn execute<'a>(
        &'a self,
        command: &'a str,
        use_sudo: bool,
        cancel: &'a CancellationToken,
    ) -> RemoteFuture<'a> {
        Box::pin(async move {
            let remote_command = self.remote_command(command, use_sudo);
            if use_sudo {
                tracing::info!(target = %self.target(), "executing (sudo): {command}");
            } else {
                tracing::info!(target = %self.target(), "executing: {command}");
            }

            let stdin_payload = if use_sudo {
                self.sudo_password.as_ref().map(|p| format!("{p}\n"))
            } else {
                None
            };

            let raw = run_child(
                self.build_command(&remote_command),
                stdin_payload,
                self.command_timeout,
                cancel,
            )
            .await
            .map_err(|e| match e {
                RemoteError::Exec(message) => RemoteError::Connection {
                    target: self.target(),
                    message,
                },
                other => other,
            })?;

            let Some(exit_code) = raw.code else {
                return Err(RemoteError::Exec("ssh client terminated by signal".into()));
            };
            if exit_code == SSH_CLIENT_FAILURE {
                return Err(RemoteError::Connection {
                    target: self.target(),
                    message: raw.stderr.trim().to_string(),
                });
            }

            let stdout = if use_sudo {
                strip_sudo_prompt(&raw.stdout)
            } else {
                raw.stdout.trim().to_string()
            };

            Ok(CommandOutput::new(exit_code, stdout, raw.stderr.trim()))
        })
    }
}
