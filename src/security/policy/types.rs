use serde::{Deserialize, Serialize};

/// Outcome of classifying a single command against the forbidden set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandVerdict {
    pub allowed: bool,
    pub reason: String,
}

impl CommandVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Plan-wide gate decision.
///
/// `flags` is the audit trail of per-command decisions in plan order, up to
/// and including the command that decided the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PlanVerdict {
    /// No forbidden and no critical command: execute without asking.
    Approved { flags: Vec<String> },
    /// No forbidden command but at least one critical: the whole plan waits.
    NeedsApproval { flags: Vec<String> },
    /// A forbidden command was found: nothing in the plan may run.
    Rejected {
        command: String,
        reason: String,
        flags: Vec<String>,
    },
}

impl PlanVerdict {
    pub fn flags(&self) -> &[String] {
        match self {
            Self::Approved { flags }
            | Self::NeedsApproval { flags }
            | Self::Rejected { flags, .. } => flags,
        }
    }

    pub const fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}
