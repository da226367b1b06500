use regex::Regex;
use std::sync::LazyLock;

/// Destructive, irreversible or fleet-threatening operations. Never executed.
const FORBIDDEN_PATTERNS: &[&str] = &[
    // recursive delete of the filesystem root
    r"\brm\s+(?:-{1,2}[\w-]+\s+)*/\*?\s*(?:$|[;&|])",
    r"--no-preserve-root",
    // raw disk writes and filesystem formatting
    r"\bmkfs(?:\.\w+)?\b",
    r"\bdd\s+.*\b(?:if|of)=",
    r">\s*/dev/(?:sd|hd|vd|xvd|nvme)",
    // fork bomb
    r":\(\)\s*\{.*\|.*&\s*\}\s*;",
    // power state
    r"\b(?:shutdown|poweroff|reboot|halt)\b",
    r"\bsystemctl\s+(?:reboot|halt|poweroff|kexec)\b",
    r"\binit\s+[06]\b",
    // partition tables and block devices
    r"\b(?:fdisk|sfdisk|gdisk|parted)\b",
    r"\bwipefs\b",
    // opening up the whole tree
    r"\bchmod\s+(?:-R\s+0?777|0?777\s+-R)\s+/\*?\s*(?:$|[;&|])",
    r"\bchown\s+(?:-R\s+\S+|\S+\s+-R)\s+/\*?\s*(?:$|[;&|])",
];

/// Reversible but operationally risky operations. Require a human.
const CRITICAL_PATTERNS: &[&str] = &[
    r"\brm\b",
    r"\bdelete\b",
    r"\bdrop\b",
    r"\btruncate\b",
    r"\b(?:kill|pkill|killall)\s+(?:-s\s*)?-?(?:9|KILL|SIGKILL)\b",
    r"\bsystemctl\s+(?:stop|restart)\b",
    r"\bservice\s+\S+\s+(?:stop|restart)\b",
    r"\biptables\b",
    r"\bufw\b",
    r"\bpasswd\b",
    r"\buser(?:add|mod|del)\b",
    r"\bchmod\b",
    r"\bchown\b",
    r"\bmv\s+/",
    r"\bcp\s+/dev/",
    r"\bapt(?:-get)?\b",
    r"\byum\b",
    r"\bdnf\b",
    r"\binstall\b",
];

static FORBIDDEN: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(FORBIDDEN_PATTERNS));
static CRITICAL: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(CRITICAL_PATTERNS));

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("built-in policy pattern"))
        .collect()
}

/// Index of the first forbidden pattern matching `command`, if any.
pub(super) fn first_forbidden_match(command: &str) -> Option<usize> {
    let command = command.trim();
    FORBIDDEN.iter().position(|re| re.is_match(command))
}

pub(super) fn matches_critical(command: &str) -> bool {
    let command = command.trim();
    CRITICAL.iter().any(|re| re.is_match(command))
}

/// Split a newline-joined plan into its non-empty trimmed commands.
pub fn plan_commands(plan: &str) -> Vec<&str> {
    plan.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect()
}
