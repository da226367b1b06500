#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use sentinel::config::{ServiceDefinition, ServiceRegistry, SharedRegistry};
use sentinel::controller::Controller;
use sentinel::error::{OracleError, RemoteError};
use sentinel::memory::EpisodeStore;
use sentinel::oracle::{Oracle, OracleFuture, OracleMessage};
use sentinel::remote::{CommandOutput, RemoteChannel, RemoteFuture};
use sentinel::workflow::{EngineSettings, RemediationEngine};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub const NGINX_CHECK: &str = "service nginx status";
pub const NGINX_UP: &str = " * nginx is running";
pub const NGINX_DOWN: &str = " * nginx is not running";

#[derive(Clone)]
pub enum Reply {
    Out(i32, &'static str),
    Unreachable,
    /// Block until the run is cancelled.
    Hang,
}

/// Remote channel with scripted replies per exact command. The last reply for
/// a command repeats; unscripted commands succeed with empty output.
#[derive(Default)]
pub struct FakeChannel {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    executed: Mutex<Vec<(String, bool)>>,
    entered_hang: Notify,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, command: &str, replies: &[Reply]) -> Self {
        self.replies
            .lock()
            .unwrap()
            .insert(command.to_string(), replies.iter().cloned().collect());
        self
    }

    /// Commands run so far with their sudo flag.
    pub fn executed(&self) -> Vec<(String, bool)> {
        self.executed.lock().unwrap().clone()
    }

    /// Executed commands other than health checks.
    pub fn remediation_commands(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .map(|(command, _)| command)
            .filter(|command| !command.ends_with(" status"))
            .collect()
    }

    /// Resolves once a `Hang` reply has been reached.
    pub async fn wait_for_hang(&self) {
        self.entered_hang.notified().await;
    }
}

impl RemoteChannel for FakeChannel {
    fn target(&self) -> String {
        "fake-host".into()
    }

    fn execute<'a>(
        &'a self,
        command: &'a str,
        use_sudo: bool,
        cancel: &'a CancellationToken,
    ) -> RemoteFuture<'a> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(RemoteError::Cancelled);
            }
            self.executed
                .lock()
                .unwrap()
                .push((command.to_string(), use_sudo));

            let reply = {
                let mut replies = self.replies.lock().unwrap();
                match replies.get_mut(command) {
                    Some(queue) if queue.len() > 1 => queue.pop_front(),
                    Some(queue) => queue.front().cloned(),
                    None => None,
                }
            };

            match reply.unwrap_or(Reply::Out(0, "")) {
                Reply::Out(code, stdout) => Ok(CommandOutput::new(code, stdout, "")),
                Reply::Unreachable => Err(RemoteError::Connection {
                    target: "fake-host".into(),
                    message: "connection refused".into(),
                }),
                Reply::Hang => {
                    self.entered_hang.notify_one();
                    cancel.cancelled().await;
                    Err(RemoteError::Cancelled)
                }
            }
        })
    }
}

/// Oracle answering from a fixed script; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<Vec<OracleMessage>>>,
}

impl ScriptedOracle {
    pub fn answering(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| (*r).to_string()).collect()),
            calls: Mutex::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// System prompt of the `index`-th call.
    pub fn system_prompt(&self, index: usize) -> String {
        self.calls.lock().unwrap()[index][0].content.clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete<'a>(&'a self, messages: &'a [OracleMessage]) -> OracleFuture<'a> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| OracleError::Request("oracle offline".into()))
        })
    }
}

pub fn nginx_registry() -> SharedRegistry {
    ServiceRegistry::from_services(vec![ServiceDefinition::new(
        "nginx",
        NGINX_CHECK,
        "is running",
        "web_server",
    )])
    .into_shared()
}

pub fn engine(
    channel: Arc<FakeChannel>,
    oracle: Arc<ScriptedOracle>,
    memory_dir: &Path,
    max_retries: u32,
) -> RemediationEngine {
    let memory = Arc::new(EpisodeStore::open(memory_dir).unwrap());
    let settings = EngineSettings {
        max_retries,
        ..EngineSettings::default()
    };
    RemediationEngine::new(channel, oracle, memory, nginx_registry(), settings)
}

pub fn controller(
    channel: Arc<FakeChannel>,
    oracle: Arc<ScriptedOracle>,
    data_dir: &Path,
) -> Arc<Controller> {
    let engine = engine(channel, oracle, &data_dir.join("memory"), 3);
    Arc::new(Controller::new(Arc::new(engine)).with_checkpoint(data_dir.join("checkpoint.json")))
}
