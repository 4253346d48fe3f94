//! Command builders for the Pulumi CLI.
//!
//! One function per subcommand. Working directory and passphrase injection
//! are applied by the caller.

use crate::exec::{CommandSpec, Tool};
use std::path::Path;

fn pulumi<const N: usize>(args: [&str; N]) -> CommandSpec {
    CommandSpec::new(Tool::Pulumi, args)
}

pub fn login(url: &str) -> CommandSpec {
    pulumi(["login", url])
}

pub fn logout() -> CommandSpec {
    pulumi(["logout"])
}

/// Export the full stack state. `show_secrets` writes secret values in
/// plaintext so they can be re-encrypted by a different provider on import.
pub fn stack_export(stack: &str, file: &Path, show_secrets: bool) -> CommandSpec {
    let mut spec = pulumi(["stack", "export"]);
    if show_secrets {
        spec = spec.arg("--show-secrets");
    }
    spec.arg("--stack")
        .arg(stack)
        .arg("--file")
        .arg(file.to_string_lossy())
}

pub fn stack_import(stack: &str, file: &Path) -> CommandSpec {
    pulumi(["stack", "import", "--stack", stack])
        .arg("--file")
        .arg(file.to_string_lossy())
}

pub fn stack_init(stack: &str, secrets_provider: Option<&str>) -> CommandSpec {
    let spec = pulumi(["stack", "init", stack, "--non-interactive"]);
    match secrets_provider {
        Some(provider) => spec.arg("--secrets-provider").arg(provider),
        None => spec,
    }
}

pub fn change_secrets_provider(stack: &str, provider: &str) -> CommandSpec {
    pulumi(["stack", "change-secrets-provider", provider, "--stack", stack])
}

pub fn preview_diff(stack: &str) -> CommandSpec {
    pulumi(["preview", "--stack", stack, "--diff"])
}

pub fn stack_rm(stack: &str) -> CommandSpec {
    pulumi(["stack", "rm", "--stack", stack, "--yes"])
}

pub fn config_set(stack: &str, key: &str, value: &str, secret: bool) -> CommandSpec {
    let spec = pulumi(["config", "set", key]).secret_arg(value);
    let spec = spec.arg("--stack").arg(stack);
    if secret {
        spec.arg("--secret")
    } else {
        spec
    }
}
