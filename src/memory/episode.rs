use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One recorded remediation attempt. Never mutated once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Episode {
    pub timestamp: DateTime<Local>,
    /// Error text in effect when the plan ran.
    pub error: String,
    pub diagnosis: String,
    /// Full newline-joined plan that was executed.
    pub command: String,
    /// Concatenated per-command outcome summaries.
    pub result: String,
    pub success: bool,
}

impl Episode {
    pub fn new(
        error: impl Into<String>,
        diagnosis: impl Into<String>,
        command: impl Into<String>,
        result: impl Into<String>,
        success: bool,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            error: error.into(),
            diagnosis: diagnosis.into(),
            command: command.into(),
            result: result.into(),
            success,
        }
    }

    pub(crate) fn error_keywords(&self) -> HashSet<String> {
        keywords(&self.error)
    }
}

/// Bag of lowercase whitespace-separated words.
pub fn keywords(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Number of distinct words shared by two keyword sets.
pub fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}
