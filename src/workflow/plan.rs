//! Post-processing of oracle plan text into executable commands.

/// Verbs that always need root on the managed host.
const PRIVILEGED_PREFIXES: &[&str] = &[
    "service ",
    "kill ",
    "pkill ",
    "rm ",
    "chmod ",
    "chown ",
    "apt ",
    "apt-get ",
    "dpkg ",
    "nginx",
    "systemctl ",
    "fuser ",
    "docker ",
    "supervisorctl ",
];

/// Turn raw oracle output into an ordered command list.
///
/// Code fences and backticks are stripped, blank and `#` comment lines are
/// dropped, and privileged verbs get a `sudo` prefix.
pub fn parse_plan(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .map(|line| line.replace('`', ""))
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| ensure_sudo(&line))
        .collect()
}

/// Prefix `sudo` onto privileged commands that lack it.
pub fn ensure_sudo(command: &str) -> String {
    let command = command.trim();
    if command.starts_with("sudo ") {
        return command.to_string();
    }
    if PRIVILEGED_PREFIXES
        .iter()
        .any(|prefix| command.starts_with(prefix))
    {
        format!("sudo {command}")
    } else {
        command.to_string()
    }
}

/// Deterministic plan used when the oracle offers nothing usable.
pub fn fallback_command(service: &str) -> String {
    format!("sudo service {service} restart")
}

/// Split a leading `sudo` off a command: `(command, needs_sudo)`.
pub fn split_sudo(command: &str) -> (&str, bool) {
    let trimmed = command.trim();
    match trimmed.strip_prefix("sudo ") {
        Some(rest) => (rest.trim_start(), true),
        None => (trimmed, false),
    }
}
