use crate::security::plan_commands;
use serde::{Deserialize, Serialize};

/// Escalation reason recorded when an operator rejects a waiting plan.
pub const REJECTED_BY_OPERATOR: &str = "plan rejected by operator";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    WaitingApproval,
    Rejected,
}

/// Nodes of the remediation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Monitor,
    Diagnose,
    Plan,
    Approve,
    Execute,
    Verify,
    Report,
    Escalate,
    /// Suspended until an operator approves or rejects the plan.
    Waiting,
}

impl Step {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monitor => "monitor",
            Self::Diagnose => "diagnose",
            Self::Plan => "plan",
            Self::Approve => "approve",
            Self::Execute => "execute",
            Self::Verify => "verify",
            Self::Report => "report",
            Self::Escalate => "escalate",
            Self::Waiting => "waiting",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator verdict on a plan held in [`Step::Waiting`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl std::str::FromStr for ApprovalDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "approved" => Ok(Self::Approve),
            "reject" | "rejected" => Ok(Self::Reject),
            other => Err(format!("unknown approval action '{other}', expected approve or reject")),
        }
    }
}

/// The record threaded through one remediation run.
///
/// Created fresh for every run and owned by whoever drives it; the engine
/// mutates it step by step and the controller keeps the latest copy for
/// inspection and checkpointing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub current_step: Option<Step>,
    /// `None` means healthy.
    pub current_error: Option<String>,
    pub affected_service: Option<String>,
    /// Diagnoses and execution summaries, most recent last.
    pub diagnosis_log: Vec<String>,
    /// Newline-joined commands of the current plan.
    pub candidate_plan: Option<String>,
    pub approval_status: ApprovalStatus,
    pub retry_count: u32,
    pub security_flags: Vec<String>,
    pub escalation_reason: Option<String>,
    pub memory_consulted: bool,
}

impl WorkflowState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan_commands(&self) -> Vec<&str> {
        self.candidate_plan
            .as_deref()
            .map(plan_commands)
            .unwrap_or_default()
    }

    pub fn last_diagnosis(&self) -> Option<&str> {
        self.diagnosis_log.last().map(String::as_str)
    }

    /// Record an operator verdict on a waiting plan.
    pub fn apply_decision(&mut self, decision: ApprovalDecision) {
        match decision {
            ApprovalDecision::Approve => self.approval_status = ApprovalStatus::Approved,
            ApprovalDecision::Reject => {
                self.approval_status = ApprovalStatus::Rejected;
                self.escalation_reason = Some(REJECTED_BY_OPERATOR.to_string());
            }
        }
    }
}

/// How a call to the driver ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Monitoring found every service running.
    Healthy,
    Recovered { service: String, attempts: u32 },
    Escalated { reason: String },
    /// Suspended on a critical plan; resume with an approval decision.
    WaitingApproval,
    /// Stopped by the operator; health is indeterminate until the next run.
    Cancelled,
}

impl RunOutcome {
    pub const fn is_waiting(&self) -> bool {
        matches!(self, Self::WaitingApproval)
    }
}
