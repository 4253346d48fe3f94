//! Push dotenv values into Pulumi stack config or SSM Parameter Store.

use crate::envfile::camel_case;
use crate::exec::{run_in, CommandRunner, CommandSpec};
use crate::secrets::{Passphrase, PASSPHRASE_ENV};
use crate::{aws, pulumi};
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub enum InjectTarget {
    Pulumi {
        stack: String,
        workspace: PathBuf,
        /// Config namespace, e.g. the project name: `<ns>:<key>`.
        namespace: Option<String>,
        /// Convert `DB_HOST` to `dbHost`.
        camel_case: bool,
        passphrase: Option<Passphrase>,
    },
    Ssm {
        /// Parameter path prefix, e.g. `/myapp/prod`.
        prefix: String,
        region: String,
    },
}

/// One key as it will be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedKey {
    pub env_key: String,
    pub target_key: String,
    pub secret: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InjectReport {
    pub dry_run: bool,
    pub planned: Vec<PlannedKey>,
    pub applied: Vec<String>,
    pub failed: Vec<KeyFailure>,
}

impl InjectReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

fn secret_key_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)SECRET|PASSWORD|TOKEN|KEY").unwrap())
}

/// Keys that look like credentials are stored encrypted.
pub fn is_secret_key(key: &str) -> bool {
    secret_key_re().is_match(key)
}

/// Normalize an SSM path prefix to `/a/b` form.
pub fn ssm_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

pub fn plan(pairs: &[(String, String)], target: &InjectTarget, all_secret: bool) -> Vec<PlannedKey> {
    pairs
        .iter()
        .map(|(key, _)| {
            let target_key = match target {
                InjectTarget::Pulumi {
                    namespace,
                    camel_case: camel,
                    ..
                } => {
                    let name = if *camel { camel_case(key) } else { key.clone() };
                    match namespace.as_deref().filter(|n| !n.is_empty()) {
                        Some(ns) => format!("{ns}:{name}"),
                        None => name,
                    }
                }
                InjectTarget::Ssm { prefix, .. } => format!("{}/{key}", ssm_prefix(prefix)),
            };
            PlannedKey {
                env_key: key.clone(),
                target_key,
                secret: all_secret || is_secret_key(key),
            }
        })
        .collect()
}

fn command_for(target: &InjectTarget, key: &PlannedKey, value: &str) -> CommandSpec {
    match target {
        InjectTarget::Pulumi {
            stack, passphrase, ..
        } => {
            let spec = pulumi::config_set(stack, &key.target_key, value, key.secret);
            match passphrase {
                Some(p) => spec.env(PASSPHRASE_ENV, p.expose()),
                None => spec,
            }
        }
        InjectTarget::Ssm { region, .. } => {
            aws::ssm_put_parameter(&key.target_key, value, key.secret, region)
        }
    }
}

/// Write every pair to `target`. Failures are collected per key; one bad key
/// does not stop the rest. With `dry_run` nothing is executed.
pub fn inject(
    runner: &mut dyn CommandRunner,
    pairs: &[(String, String)],
    target: &InjectTarget,
    all_secret: bool,
    dry_run: bool,
) -> InjectReport {
    let planned = plan(pairs, target, all_secret);
    let mut report = InjectReport {
        dry_run,
        planned: planned.clone(),
        ..Default::default()
    };
    if dry_run {
        return report;
    }

    for (key, (_, value)) in planned.iter().zip(pairs) {
        let spec = command_for(target, key, value);
        let res = match target {
            InjectTarget::Pulumi { workspace, .. } => run_in(runner, spec, workspace),
            InjectTarget::Ssm { .. } => runner.run(&spec),
        };
        if res.success {
            info!(key = %key.target_key, secret = key.secret, "set");
            report.applied.push(key.target_key.clone());
        } else {
            warn!(key = %key.target_key, "failed: {}", res.output.trim());
            report.failed.push(KeyFailure {
                key: key.env_key.clone(),
                error: res.output.trim().to_string(),
            });
        }
    }
    report
}
