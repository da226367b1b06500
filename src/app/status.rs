use crate::memory::{Episode, MemorySummary};
use crate::security::{PlanVerdict, SecurityPolicy};
use crate::utils::truncate_with_ellipsis;
use crate::workflow::{RunOutcome, ServiceHealth, ServiceStatus, WorkflowState};
use std::fmt::Write as _;

const EPISODE_FIELD_CHARS: usize = 80;

/// Gate classification of a single command line (or a newline-joined plan).
pub fn render_check(policy: &SecurityPolicy, command: &str) -> String {
    let commands = crate::security::plan_commands(command);
    match policy.evaluate_plan(&commands) {
        PlanVerdict::Rejected { reason, .. } => format!("✗ BLOCKED  {reason}"),
        PlanVerdict::NeedsApproval { flags } => {
            let mut out = String::from("! CRITICAL  requires operator approval");
            for flag in flags {
                let _ = write!(out, "\n    {flag}");
            }
            out
        }
        PlanVerdict::Approved { .. } => "✓ SAFE  runs without approval".to_string(),
    }
}

pub fn render_fleet(statuses: &[ServiceStatus]) -> String {
    if statuses.is_empty() {
        return "No services configured.".to_string();
    }

    let mut lines = vec!["◆ Fleet status".to_string(), String::new()];
    for status in statuses {
        let marker = match status.status {
            ServiceHealth::Running => "✓",
            ServiceHealth::Stopped => "✗",
            ServiceHealth::Error => "!",
        };
        let health = match status.status {
            ServiceHealth::Running => "running",
            ServiceHealth::Stopped => "stopped",
            ServiceHealth::Error => "error",
        };
        lines.push(format!(
            "  {marker} {:<16} {:<8} {:<12} {}",
            status.name,
            health,
            status.kind,
            truncate_with_ellipsis(status.details.trim(), 60)
        ));
    }
    lines.join("\n")
}

/// Most recent episodes last, limited to the newest `limit` when given.
pub fn render_episodes(
    episodes: &[Episode],
    limit: Option<usize>,
    summary: MemorySummary,
) -> String {
    let skip = limit.map_or(0, |limit| episodes.len().saturating_sub(limit));
    let mut lines = Vec::new();
    for episode in &episodes[skip..] {
        lines.push(format!(
            "{} {} {}",
            episode.timestamp.format("%Y-%m-%d %H:%M:%S"),
            if episode.success { "✓" } else { "✗" },
            truncate_with_ellipsis(&episode.error, EPISODE_FIELD_CHARS)
        ));
        lines.push(format!(
            "    plan: {}",
            truncate_with_ellipsis(&episode.command.replace('\n', "; "), EPISODE_FIELD_CHARS)
        ));
    }
    if lines.is_empty() {
        lines.push("No episodes recorded yet.".to_string());
    }
    lines.push(String::new());
    lines.push(summary.to_string());
    lines.join("\n")
}

pub fn render_outcome(outcome: &RunOutcome, state: &WorkflowState) -> String {
    match outcome {
        RunOutcome::Healthy => "✓ All services healthy.".to_string(),
        RunOutcome::Recovered { service, attempts } => {
            format!("✓ Recovered {service} after {attempts} attempt(s).")
        }
        RunOutcome::Escalated { reason } => format!("✗ Escalated: {reason}"),
        RunOutcome::Cancelled => "■ Run cancelled.".to_string(),
        RunOutcome::WaitingApproval => {
            let mut out = String::from("! Plan held for operator approval:");
            for command in state.plan_commands() {
                let _ = write!(out, "\n    $ {command}");
            }
            for flag in &state.security_flags {
                let _ = write!(out, "\n    {flag}");
            }
            out.push_str("\n  Resume with: sentinel resume --approve | --reject");
            out
        }
    }
}
