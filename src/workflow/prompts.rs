//! Oracle prompts for the diagnose and plan steps.

use crate::oracle::OracleMessage;
use std::collections::BTreeSet;
use std::fmt::Write;

/// Prior log entries quoted back to the oracle when diagnosing.
pub const HISTORY_ENTRIES: usize = 3;

const DIAGNOSIS_PREAMBLE: &str = "\
You are Sentinel, an autonomous DevOps agent.
Analyse the error and give a BRIEF diagnosis (at most 3 lines).
State the probable cause and the recommended fix.";

const DIAGNOSIS_RULES: &str = "\
CRITICAL RULES:
1. Do NOT suggest commands that already failed (listed above).
2. If 'service' or 'apt-get' fail, try alternatives such as 'dmesg' or reading the specific log files.";

const PLAN_PREAMBLE: &str = "\
You are a DevOps automation engine.
Produce a remediation plan of 1 to 3 shell commands.";

const PLAN_RULES: &str = "\
RULES:
1. Output between 1 and 3 commands, one per line.
2. Do NOT chain commands with &&, || or ;.
3. Every administrative command takes 'sudo'.
4. Reply ONLY with the commands, no explanation and no backticks.
5. NEVER repeat a command that already failed.
6. Base the fix on the diagnosis provided.
7. Always pass '-y' or '--yes' to package managers.
8. On a 'lock' or 'dpkg interrupted' error, use 'sudo dpkg --configure -a'.";

pub struct DiagnosisPrompt<'a> {
    pub service: &'a str,
    pub error: &'a str,
    pub history: &'a [String],
    pub memory_context: &'a str,
    pub knowledge: &'a str,
}

pub fn diagnosis_messages(prompt: &DiagnosisPrompt<'_>) -> Vec<OracleMessage> {
    let history = if prompt.history.is_empty() {
        "First attempt.".to_string()
    } else {
        let start = prompt.history.len().saturating_sub(HISTORY_ENTRIES);
        prompt.history[start..].join("\n")
    };

    let mut system = String::from(DIAGNOSIS_PREAMBLE);
    let _ = write!(system, "\n\nAffected service: {}\n", prompt.service);
    let _ = write!(system, "\nAttempt history:\n{history}\n");
    if !prompt.memory_context.is_empty() {
        let _ = write!(system, "\n{}", prompt.memory_context);
    }
    let _ = write!(system, "\nTechnical documentation:\n{}\n\n", prompt.knowledge);
    system.push_str(DIAGNOSIS_RULES);

    vec![
        OracleMessage::system(system),
        OracleMessage::user(format!("Error: {}", prompt.error)),
    ]
}

pub struct PlanPrompt<'a> {
    pub service: &'a str,
    pub error: &'a str,
    pub attempt: u32,
    pub diagnosis: &'a str,
    pub failed_commands: &'a BTreeSet<String>,
    pub remote_user: &'a str,
}

pub fn plan_messages(prompt: &PlanPrompt<'_>) -> Vec<OracleMessage> {
    let mut system = String::from(PLAN_PREAMBLE);
    let _ = write!(
        system,
        "\n\nCONTEXT:\n- Affected service: {}\n- You connect as user '{}' (NOT root)\n- Administrative commands need 'sudo'\n\n",
        prompt.service, prompt.remote_user
    );
    system.push_str(PLAN_RULES);
    if !prompt.failed_commands.is_empty() {
        system.push_str("\n\nCOMMANDS THAT ALREADY FAILED (FORBIDDEN to repeat):\n");
        system.push_str(&bullet_list(prompt.failed_commands));
    }

    vec![
        OracleMessage::system(system),
        OracleMessage::user(format!(
            "Error: {}\nAttempt: {}\nDiagnosis: {}",
            prompt.error, prompt.attempt, prompt.diagnosis
        )),
    ]
}

pub fn bullet_list(items: &BTreeSet<String>) -> String {
    items.iter().fold(String::new(), |mut out, item| {
        let _ = writeln!(out, "- {item}");
        out
    })
}
