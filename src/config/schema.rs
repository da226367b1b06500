use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory (services, episodes, checkpoint) - computed, not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

// ── Reasoning oracle ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// OpenAI-compatible API root (default: https://api.openai.com/v1)
    #[serde(default = "default_oracle_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_oracle_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f64,
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_oracle_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_oracle_model() -> String {
    "gpt-4o".into()
}

fn default_oracle_timeout_secs() -> u64 {
    120
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_base_url(),
            api_key: None,
            model: default_oracle_model(),
            temperature: 0.0,
            timeout_secs: default_oracle_timeout_secs(),
        }
    }
}

// ── Remote command channel ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKind {
    /// System `ssh` client against `host:port`
    #[default]
    Ssh,
    /// `sh -c` on the controller host itself
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub kind: RemoteKind,
    #[serde(default = "default_remote_host")]
    pub host: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    #[serde(default = "default_remote_user")]
    pub user: String,
    /// Credential piped to `sudo -S` when a command needs privileges
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
}

fn default_remote_host() -> String {
    "localhost".into()
}

fn default_remote_port() -> u16 {
    2222
}

fn default_remote_user() -> String {
    "sentinel".into()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_command_timeout_secs() -> u64 {
    120
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            kind: RemoteKind::default(),
            host: default_remote_host(),
            port: default_remote_port(),
            user: default_remote_user(),
            password: None,
            identity_file: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            command_timeout_secs: default_command_timeout_secs(),
        }
    }
}

// ── Workflow ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Failed verifications before a run escalates (default: 5)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between cycles in watch mode (default: 30)
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    /// Characters of stdout/stderr kept per command in the result summary
    #[serde(default = "default_output_excerpt_chars")]
    pub output_excerpt_chars: usize,
}

fn default_max_retries() -> u32 {
    5
}

fn default_monitor_interval_secs() -> u64 {
    30
}

fn default_output_excerpt_chars() -> usize {
    200
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            monitor_interval_secs: default_monitor_interval_secs(),
            output_excerpt_chars: default_output_excerpt_chars(),
        }
    }
}

// ── Episodic memory ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Episode store directory (default: <data_dir>/memory)
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// ── Knowledge base ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Directory of .md/.txt manuals (default: <data_dir>/manuals)
    #[serde(default)]
    pub manuals_dir: Option<PathBuf>,
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

fn default_max_context_chars() -> usize {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            manuals_dir: None,
            max_context_chars: default_max_context_chars(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_host")]
    pub host: String,
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

fn sentinel_home() -> PathBuf {
    UserDirs::new().map_or_else(
        || PathBuf::from(".sentinel"),
        |dirs| dirs.home_dir().join(".sentinel"),
    )
}

impl Default for Config {
    fn default() -> Self {
        let home = sentinel_home();
        Self {
            data_dir: home.join("data"),
            config_path: home.join("config.toml"),
            oracle: OracleConfig::default(),
            remote: RemoteConfig::default(),
            workflow: WorkflowConfig::default(),
            memory: MemoryConfig::default(),
            knowledge: KnowledgeConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    /// Load `~/.sentinel/config.toml`, writing defaults on first run.
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_in(&home.join(".sentinel"))
    }

    /// Same as [`Self::load_or_init`] rooted at an explicit directory.
    pub fn load_or_init_in(sentinel_dir: &Path) -> Result<Self> {
        let config_path = sentinel_dir.join("config.toml");
        let data_dir = sentinel_dir.join("data");

        if !data_dir.exists() {
            fs::create_dir_all(&data_dir).context("Failed to create .sentinel/data directory")?;
        }

        let mut config = if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            // Set computed paths that are skipped during serialization
            config.config_path.clone_from(&config_path);
            config.data_dir = data_dir;
            config
        } else {
            let config = Self {
                config_path: config_path.clone(),
                data_dir,
                ..Self::default()
            };
            config.save()?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) =
            std::env::var("SENTINEL_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            if !key.is_empty() {
                self.oracle.api_key = Some(key);
            }
        }

        if let Ok(model) = std::env::var("SENTINEL_MODEL") {
            if !model.is_empty() {
                self.oracle.model = model;
            }
        }

        if let Ok(host) = std::env::var("SSH_HOST") {
            if !host.is_empty() {
                self.remote.host = host;
            }
        }

        if let Ok(port) = std::env::var("SSH_PORT") {
            match port.parse() {
                Ok(port) => self.remote.port = port,
                Err(_) => tracing::warn!("ignoring invalid SSH_PORT value: {port}"),
            }
        }

        if let Ok(user) = std::env::var("SSH_USER") {
            if !user.is_empty() {
                self.remote.user = user;
            }
        }

        if let Ok(password) = std::env::var("SSH_PASS") {
            if !password.is_empty() {
                self.remote.password = Some(password);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.workflow.max_retries == 0 {
            anyhow::bail!("workflow.max_retries must be >= 1");
        }
        if self.workflow.monitor_interval_secs == 0 {
            anyhow::bail!("workflow.monitor_interval_secs must be >= 1");
        }
        if self.oracle.temperature.is_nan() || !(0.0..=2.0).contains(&self.oracle.temperature) {
            anyhow::bail!("oracle.temperature must be in [0.0, 2.0]");
        }
        if self.remote.kind == RemoteKind::Ssh && self.remote.host.trim().is_empty() {
            anyhow::bail!("remote.host must not be empty for the ssh channel");
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }

    pub fn memory_dir(&self) -> PathBuf {
        self.memory
            .dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("memory"))
    }

    pub fn manuals_dir(&self) -> PathBuf {
        self.knowledge
            .manuals_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("manuals"))
    }

    pub fn services_path(&self) -> PathBuf {
        self.data_dir.join("services.json")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join("checkpoint.json")
    }
}
