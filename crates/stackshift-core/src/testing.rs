//! Scripted [`CommandRunner`] for unit tests.

use crate::exec::{CommandRunner, CommandSpec, StepResult, Tool};
use std::path::PathBuf;

pub struct Call {
    pub spec: CommandSpec,
    /// Whether the most recently exported state file existed when this call
    /// was issued.
    pub export_present: bool,
}

struct Rule {
    tool: Tool,
    prefix: Vec<String>,
    result: StepResult,
}

/// Answers commands from a rule list (first prefix match wins); unmatched
/// commands succeed with empty output. `stack export` writes a small state
/// file to its `--file` path unless a rule makes it fail.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    pub calls: Vec<Call>,
    export_file: Option<PathBuf>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, tool: Tool, prefix: &[&str], result: StepResult) -> Self {
        self.rules.push(Rule {
            tool,
            prefix: prefix.iter().map(|s| s.to_string()).collect(),
            result,
        });
        self
    }

    pub fn fail(self, tool: Tool, prefix: &[&str], stderr: &str) -> Self {
        self.on(tool, prefix, StepResult::failed(stderr))
    }

    pub fn stdout(self, tool: Tool, prefix: &[&str], stdout: &str) -> Self {
        self.on(tool, prefix, StepResult::ok(stdout))
    }

    /// Calls as `tool arg arg ...` strings, for readable assertions.
    pub fn lines(&self) -> Vec<String> {
        self.calls
            .iter()
            .map(|c| format!("{} {}", c.spec.tool, c.spec.args.join(" ")))
            .collect()
    }

    pub fn called(&self, tool: Tool, prefix: &[&str]) -> bool {
        self.find(tool, prefix).is_some()
    }

    pub fn find(&self, tool: Tool, prefix: &[&str]) -> Option<&Call> {
        self.calls
            .iter()
            .find(|c| c.spec.tool == tool && c.spec.starts_with(prefix))
    }

    pub fn position(&self, tool: Tool, prefix: &[&str]) -> Option<usize> {
        self.calls
            .iter()
            .position(|c| c.spec.tool == tool && c.spec.starts_with(prefix))
    }

    pub fn count(&self, tool: Tool, prefix: &[&str]) -> usize {
        self.calls
            .iter()
            .filter(|c| c.spec.tool == tool && c.spec.starts_with(prefix))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&mut self, spec: &CommandSpec) -> StepResult {
        let export_present = self.export_file.as_ref().is_some_and(|p| p.exists());
        self.calls.push(Call {
            spec: spec.clone(),
            export_present,
        });

        let prefix_of = |r: &Rule| {
            let p: Vec<&str> = r.prefix.iter().map(String::as_str).collect();
            r.tool == spec.tool && spec.starts_with(&p)
        };
        let result = self
            .rules
            .iter()
            .find(|r| prefix_of(r))
            .map(|r| r.result.clone())
            .unwrap_or_else(|| StepResult::ok(""));

        if spec.tool == Tool::Pulumi && spec.starts_with(&["stack", "export"]) {
            if let Some(file) = spec.flag_value("--file") {
                let path = PathBuf::from(file);
                if result.success {
                    std::fs::write(&path, br#"{"version":3,"deployment":{}}"#).ok();
                }
                self.export_file = Some(path);
            }
        }
        result
    }
}
