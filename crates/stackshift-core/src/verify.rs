//! Post-import verification: a dry-run preview against the target backend
//! must report no pending changes.

use crate::exec::{CommandRunner, CommandSpec, StepResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    ChangesDetected,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Clean => f.write_str("clean"),
            Verdict::ChangesDetected => f.write_str("changes detected"),
        }
    }
}

/// Matches both summary styles the CLI has printed over time:
/// `+ 2 to create` / `~ 1 to update` / `+-1 to replace` and
/// `3 resources to create`.
fn change_count_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)(?:^|\s)(?:\+-|[+~-])?\s*(\d+)\s+(?:resources?\s+)?to\s+(?:create|update|delete|replace)\b")
            .unwrap()
    })
}

/// Classify preview output. A failed preview is never treated as clean.
///
/// Any create/update/delete/replace count other than zero is a change, however
/// large; zero
/// counts, "unchanged" summaries and output with no counts at all are clean.
pub fn classify(output: &str, exit_success: bool) -> Verdict {
    if !exit_success {
        return Verdict::ChangesDetected;
    }
    let changed = change_count_re()
        .captures_iter(output)
        .filter_map(|c| c.get(1))
        .any(|n| n.as_str().bytes().any(|b| b != b'0'));
    if changed {
        Verdict::ChangesDetected
    } else {
        Verdict::Clean
    }
}

/// Run `spec` (a preview command) and classify the result.
pub fn verify(runner: &mut dyn CommandRunner, spec: &CommandSpec) -> (Verdict, StepResult) {
    let res = runner.run(spec);
    let text = if res.success { &res.stdout } else { &res.output };
    (classify(text, res.success), res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_pattern_detects_creates() {
        for n in [1, 2, 17, 300] {
            let out = format!("Previewing update (dev):\n\nResources:\n    + {n} to create\n    4 unchanged\n");
            assert_eq!(classify(&out, true), Verdict::ChangesDetected, "{n}");
        }
    }

    #[test]
    fn update_delete_replace_detected() {
        assert_eq!(classify("Resources:\n    ~ 1 to update\n", true), Verdict::ChangesDetected);
        assert_eq!(classify("Resources:\n    - 3 to delete\n", true), Verdict::ChangesDetected);
        assert_eq!(classify("Resources:\n    +-1 to replace\n", true), Verdict::ChangesDetected);
    }

    #[test]
    fn phrase_pattern_detects_changes() {
        assert_eq!(classify("2 resources to create", true), Verdict::ChangesDetected);
        assert_eq!(classify("1 resource to update", true), Verdict::ChangesDetected);
    }

    #[test]
    fn zero_counts_are_clean() {
        assert_eq!(classify("0 resources to create/update/delete", true), Verdict::Clean);
        assert_eq!(classify("Resources:\n    + 0 to create\n    12 unchanged\n", true), Verdict::Clean);
    }

    #[test]
    fn oversized_count_is_still_a_change() {
        assert_eq!(classify("+ 99999999999999999999999 to create", true), Verdict::ChangesDetected);
        assert_eq!(classify("Resources:\n    + 000 to create\n", true), Verdict::Clean);
    }

    #[test]
    fn unchanged_only_is_clean() {
        let out = "Previewing update (dev)\n\nResources:\n    12 unchanged\n\nno changes\n";
        assert_eq!(classify(out, true), Verdict::Clean);
    }

    #[test]
    fn failure_is_never_clean() {
        assert_eq!(classify("Resources:\n    12 unchanged\n", false), Verdict::ChangesDetected);
        assert_eq!(classify("", false), Verdict::ChangesDetected);
    }

    #[test]
    fn verify_runs_command() {
        use crate::exec::Tool;
        use crate::testing::ScriptedRunner;
        let mut runner = ScriptedRunner::new().stdout(Tool::Pulumi, &["preview"], "    ~ 2 to update\n");
        let (verdict, res) = verify(&mut runner, &crate::pulumi::preview_diff("dev"));
        assert_eq!(verdict, Verdict::ChangesDetected);
        assert!(res.success);
    }
}
