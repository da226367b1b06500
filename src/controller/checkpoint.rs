use crate::memory::write_atomic;
use crate::workflow::WorkflowState;
use anyhow::Context;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Persist a suspended run.
pub fn save_checkpoint(path: &Path, state: &WorkflowState) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(state).context("Failed to serialize checkpoint")?;
    write_atomic(path, &json)
        .with_context(|| format!("Failed to write checkpoint {}", path.display()))?;
    tracing::info!(path = %path.display(), "checkpoint written");
    Ok(())
}

/// Load a suspended run, `None` when no checkpoint exists.
pub fn load_checkpoint(path: &Path) -> anyhow::Result<Option<WorkflowState>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read checkpoint {}", path.display()));
        }
    };
    let state = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse checkpoint {}", path.display()))?;
    Ok(Some(state))
}

pub fn clear_checkpoint(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
