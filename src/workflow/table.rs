//! The transition table shared by full runs and resumed runs.

use super::state::{ApprovalStatus, Step, WorkflowState};
use crate::error::WorkflowError;

/// Where the driver goes after `step` has run, or `None` when the run stops.
pub fn next_step(step: Step, state: &WorkflowState, max_retries: u32) -> Option<Step> {
    match step {
        Step::Monitor => state.current_error.is_some().then_some(Step::Diagnose),
        Step::Diagnose => Some(Step::Plan),
        Step::Plan => Some(Step::Approve),
        Step::Approve => Some(match state.approval_status {
            ApprovalStatus::Approved => Step::Execute,
            ApprovalStatus::Rejected => Step::Escalate,
            // Pending never survives the gate; hold it rather than execute.
            ApprovalStatus::WaitingApproval | ApprovalStatus::Pending => Step::Waiting,
        }),
        Step::Execute => Some(Step::Verify),
        Step::Verify => Some(if state.current_error.is_none() {
            Step::Report
        } else if state.retry_count >= max_retries {
            Step::Escalate
        } else {
            Step::Diagnose
        }),
        Step::Report | Step::Escalate | Step::Waiting => None,
    }
}

/// Entry step for a run resumed after an operator decision.
pub fn resume_entry(state: &WorkflowState) -> Result<Step, WorkflowError> {
    match state.approval_status {
        ApprovalStatus::Approved => Ok(Step::Execute),
        ApprovalStatus::Rejected => Ok(Step::Escalate),
        ApprovalStatus::Pending | ApprovalStatus::WaitingApproval => {
            Err(WorkflowError::NotWaitingForApproval)
        }
    }
}
