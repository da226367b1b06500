use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for Sentinel.
///
/// Each subsystem defines its own error variant. The workflow engine matches
/// on these to decide between fallback, bounded retry, escalation and abort;
/// application glue continues to use `anyhow::Result` for context chains.
#[derive(Debug, Error)]
pub enum SentinelError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Security / Policy ───────────────────────────────────────────────
    #[error("security: {0}")]
    Security(#[from] SecurityError),

    // ── Remote command channel ──────────────────────────────────────────
    #[error("remote: {0}")]
    Remote(#[from] RemoteError),

    // ── Reasoning oracle ────────────────────────────────────────────────
    #[error("oracle: {0}")]
    Oracle(#[from] OracleError),

    // ── Episodic memory ─────────────────────────────────────────────────
    #[error("memory: {0}")]
    Memory(#[from] MemoryError),

    // ── Run lifecycle ───────────────────────────────────────────────────
    #[error("workflow: {0}")]
    Workflow(#[from] WorkflowError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Security errors ────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SecurityError {
    /// A forbidden command was found in a plan. Fatal to the plan.
    #[error("policy violation: {reason}")]
    PolicyViolation { command: String, reason: String },
}

// ─── Remote channel errors ──────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("connection to {target} failed: {message}")]
    Connection { target: String, message: String },

    #[error("failed to run command: {0}")]
    Exec(String),

    #[error("command timed out after {0}s and was killed")]
    Timeout(u64),

    #[error("cancelled by operator")]
    Cancelled,
}

impl RemoteError {
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// ─── Oracle errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("oracle returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle returned no usable content")]
    EmptyResponse,

    #[error("oracle API key not set")]
    MissingApiKey,

    #[error("cancelled by operator")]
    Cancelled,
}

// ─── Memory errors ──────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("failed to load episodes from {path}: {message}")]
    Load { path: String, message: String },

    #[error("failed to persist episodes to {path}: {message}")]
    Persist { path: String, message: String },
}

// ─── Workflow / run lifecycle errors ────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("a remediation run is already active")]
    AlreadyRunning,

    #[error("no remediation run is active")]
    NotRunning,

    #[error("the run is not waiting for approval")]
    NotWaitingForApproval,

    #[error("run cancelled by operator")]
    Cancelled,
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, SentinelError>;
