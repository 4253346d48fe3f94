use crate::cmd::{region, Context};
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::{ArgGroup, Subcommand};
use stackshift_core::backend::validate_region;
use stackshift_core::envfile;
use stackshift_core::inject::{inject, InjectReport, InjectTarget};
use stackshift_core::paths::DEFAULT_ENV_FILE;
use stackshift_core::secrets::Passphrase;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum EnvSubcommand {
    /// Set every KEY=VALUE from a dotenv file as stack config or SSM parameters
    #[command(group(ArgGroup::new("target").args(["stack", "ssm_prefix"])))]
    Inject {
        /// Dotenv file (relative paths resolve against the workspace)
        #[arg(long, short = 'f', default_value = DEFAULT_ENV_FILE)]
        file: PathBuf,

        /// Write to this stack's Pulumi config
        #[arg(long)]
        stack: Option<String>,

        /// Write SSM parameters under this path (default: ssm_prefix in stackshift.yaml)
        #[arg(long)]
        ssm_prefix: Option<String>,

        /// Config namespace, producing `<namespace>:<key>`
        #[arg(long)]
        namespace: Option<String>,

        /// Keep KEY_NAMES as written instead of converting to camelCase
        #[arg(long)]
        raw_keys: bool,

        /// Store every value as a secret
        #[arg(long)]
        all_secret: bool,

        /// Show what would be set without setting anything
        #[arg(long)]
        dry_run: bool,

        /// AWS region for SSM
        #[arg(long)]
        region: Option<String>,

        /// Passphrase for passphrase-encrypted stacks
        #[arg(long)]
        passphrase: Option<String>,
    },
}

pub fn run(ctx: &Context, subcmd: EnvSubcommand) -> anyhow::Result<()> {
    match subcmd {
        EnvSubcommand::Inject {
            file,
            stack,
            ssm_prefix,
            namespace,
            raw_keys,
            all_secret,
            dry_run,
            region: flag,
            passphrase,
        } => {
            let config = ctx.config()?;
            let path = if file.is_absolute() {
                file
            } else {
                ctx.workspace.join(file)
            };
            let pairs = envfile::load(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;

            let target = match stack {
                Some(stack) => InjectTarget::Pulumi {
                    stack: config.qualify_stack(&stack),
                    workspace: ctx.workspace.clone(),
                    namespace,
                    camel_case: !raw_keys,
                    passphrase: passphrase.filter(|p| !p.is_empty()).map(Passphrase::new),
                },
                None => {
                    let region = region(flag.as_deref(), &config);
                    validate_region(&region)?;
                    let prefix = ssm_prefix.or(config.ssm_prefix.clone()).context(
                        "--stack or --ssm-prefix is required (or set ssm_prefix in stackshift.yaml)",
                    )?;
                    InjectTarget::Ssm { prefix, region }
                }
            };

            let mut runner = ctx.runner();
            let report = inject(&mut runner, &pairs, &target, all_secret, dry_run);
            if ctx.json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
            if !report.succeeded() {
                anyhow::bail!("{} of {} keys failed", report.failed.len(), report.planned.len());
            }
            Ok(())
        }
    }
}

fn print_report(report: &InjectReport) {
    let rows = report
        .planned
        .iter()
        .map(|p| {
            let status = if report.dry_run {
                "planned"
            } else if report.failed.iter().any(|f| f.key == p.env_key) {
                "failed"
            } else {
                "set"
            };
            let kind = if p.secret { "secret" } else { "plain" };
            vec![p.env_key.clone(), p.target_key.clone(), kind.to_string(), status.to_string()]
        })
        .collect();
    print_table(&["KEY", "TARGET", "KIND", "STATUS"], rows);
    for f in &report.failed {
        println!("error: {}: {}", f.key, f.error);
    }
}
