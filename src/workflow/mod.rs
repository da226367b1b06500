//! Remediation workflow: state, transition table and the driver.
//!
//! One run walks MONITOR → DIAGNOSE → PLAN → APPROVE → EXECUTE → VERIFY and
//! ends in REPORT, ESCALATE or WAITING. A waiting run is resumed through
//! [`RemediationEngine::resume`], which re-enters the same table at EXECUTE
//! (approved) or ESCALATE (rejected).

mod engine;
pub mod plan;
pub mod prompts;
mod state;
pub mod table;

pub use engine::{
    CONNECTIVITY_SERVICE, EngineSettings, RETRY_LIMIT_REASON, RemediationEngine, ServiceHealth,
    ServiceStatus,
};
pub use state::{
    ApprovalDecision, ApprovalStatus, REJECTED_BY_OPERATOR, RunOutcome, Step, WorkflowState,
};
