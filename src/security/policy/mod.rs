mod command;
mod types;

pub use command::plan_commands;
pub use types::{CommandVerdict, PlanVerdict};

use command::{first_forbidden_match, matches_critical};

const FORBIDDEN_PATTERN_ERROR: &str = "blocked by security policy: forbidden pattern";

/// Two-tier command gate applied to every plan before execution.
///
/// Forbidden commands are denied outright; critical commands are allowed but
/// send the whole plan to manual approval. The gate never executes anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecurityPolicy;

impl SecurityPolicy {
    pub const fn new() -> Self {
        Self
    }

    /// Classify a single command against the forbidden set.
    ///
    /// The matching pattern is not echoed back in the reason.
    pub fn validate(&self, command: &str) -> CommandVerdict {
        match first_forbidden_match(command) {
            Some(index) => {
                tracing::debug!(pattern_index = index, "forbidden pattern matched");
                CommandVerdict::deny(FORBIDDEN_PATTERN_ERROR)
            }
            None => CommandVerdict::allow(),
        }
    }

    /// Whether `command` is reversible but risky enough to need a human.
    /// Independent of [`Self::validate`]: a command may be both allowed and critical.
    pub fn is_critical(&self, command: &str) -> bool {
        matches_critical(command)
    }

    /// Apply the plan-wide policy to `commands`, in order.
    ///
    /// The first forbidden command rejects the whole plan. Otherwise any
    /// critical command places the whole plan in manual approval, including
    /// its non-critical commands.
    pub fn evaluate_plan<S: AsRef<str>>(&self, commands: &[S]) -> PlanVerdict {
        let mut flags = Vec::new();
        let mut has_critical = false;

        for command in commands {
            let command = command.as_ref().trim();
            if command.is_empty() {
                continue;
            }

            let verdict = self.validate(command);
            if !verdict.allowed {
                flags.push(format!("BLOCKED: {}", verdict.reason));
                return PlanVerdict::Rejected {
                    command: command.to_string(),
                    reason: verdict.reason,
                    flags,
                };
            }

            if self.is_critical(command) {
                has_critical = true;
                flags.push(format!("CRITICAL: {command}"));
            }
        }

        if has_critical {
            PlanVerdict::NeedsApproval { flags }
        } else {
            PlanVerdict::Approved { flags }
        }
    }
}
