use crate::cmd::{region, Context};
use crate::output::{print_json, print_table, print_warnings};
use crate::prompt::StdinConfirm;
use anyhow::{bail, Context as _};
use clap::Args;
use stackshift_core::backend::{parse_backend, validate_region, BackendDescriptor};
use stackshift_core::config::Config;
use stackshift_core::migrate::{migrate, CreateFlags, FixedAnswer, MigrationReport, MigrationRequest};
use stackshift_core::secrets::{Passphrase, SecretsProvider};

#[derive(Args)]
pub struct MigrateArgs {
    /// Stack to migrate: `name` or `org/name`
    #[arg(long, short = 's')]
    stack: String,

    /// Backend holding the stack today: `cloud`, `s3`, or an `s3://` URL
    #[arg(long, default_value = "cloud")]
    from: String,

    /// Backend to move the stack to (default: the other side of --from)
    #[arg(long)]
    to: Option<String>,

    /// Bucket for a bare `s3` side (default: backend.bucket in stackshift.yaml)
    #[arg(long)]
    bucket: Option<String>,

    /// DynamoDB lock table for a bare `s3` side
    #[arg(long)]
    lock_table: Option<String>,

    /// AWS region (default: AWS_REGION, then stackshift.yaml, then us-east-1)
    #[arg(long)]
    region: Option<String>,

    /// Secrets provider for the new stack: service, passphrase, awskms, default, or a URL
    #[arg(long)]
    secrets_provider: Option<String>,

    /// KMS alias for the awskms provider
    #[arg(long)]
    kms_alias: Option<String>,

    /// Passphrase for the passphrase provider
    #[arg(long)]
    passphrase: Option<String>,

    /// Switch the source stack to this secrets provider before exporting
    #[arg(long, value_name = "PROVIDER")]
    change_source_secrets_provider: Option<String>,

    /// Create the target bucket if it does not exist
    #[arg(long)]
    create_bucket: bool,

    /// Create the lock table if it does not exist
    #[arg(long)]
    create_lock_table: bool,

    /// Create the KMS key and alias if they do not exist
    #[arg(long)]
    create_kms_key: bool,

    /// Create every missing resource
    #[arg(long)]
    create_all: bool,

    /// Skip the post-import preview
    #[arg(long)]
    skip_verify: bool,

    /// Remove the stack from the source backend after a successful migration
    #[arg(long)]
    delete_source: bool,

    /// Continue past a verification mismatch without asking
    #[arg(long, short = 'y')]
    yes: bool,

    /// Never prompt; an unconfirmed mismatch aborts the run
    #[arg(long)]
    non_interactive: bool,
}

pub fn run(ctx: &Context, args: MigrateArgs) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let req = build_request(ctx, &config, args)?;

    let mut runner = ctx.runner();
    let report = if req.interactive {
        migrate(&mut runner, &mut StdinConfirm, &req)
    } else {
        migrate(&mut runner, &mut FixedAnswer(false), &req)
    };

    if ctx.json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    if !report.succeeded() {
        if let Some(notice) = report.abort_notice() {
            eprintln!("note: {notice}");
        }
        let state = report
            .failed_state
            .map(|s| s.to_string())
            .unwrap_or_default();
        let error = report.error.unwrap_or_default();
        bail!("migration aborted at {state}: {error}");
    }
    Ok(())
}

fn build_request(ctx: &Context, config: &Config, args: MigrateArgs) -> anyhow::Result<MigrationRequest> {
    let region = region(args.region.as_deref(), config);
    validate_region(&region)?;

    let from = resolve_side(&args.from, &args, config, &region).context("invalid --from")?;
    let to_spec = match &args.to {
        Some(to) => to.clone(),
        None if from.is_cloud() => "s3".to_string(),
        None => "cloud".to_string(),
    };
    let to = resolve_side(&to_spec, &args, config, &region).context("invalid --to")?;

    let kms_alias = args.kms_alias.as_deref().or(config.backend.kms_alias.as_deref());
    let provider_kind = args
        .secrets_provider
        .as_deref()
        .or(config.migrate.secrets_provider.as_deref())
        .unwrap_or("default");
    let secrets_provider = SecretsProvider::from_selection(provider_kind, kms_alias, &region)?;
    let source_secrets_provider = args
        .change_source_secrets_provider
        .as_deref()
        .map(|kind| SecretsProvider::from_selection(kind, kms_alias, &region))
        .transpose()?;

    let create_all = args.create_all || config.migrate.create_resources;
    let mut req = MigrationRequest::new(config.qualify_stack(&args.stack), from, to, &ctx.workspace);
    req.secrets_provider = secrets_provider;
    req.source_secrets_provider = source_secrets_provider;
    req.passphrase = args.passphrase.filter(|p| !p.is_empty()).map(Passphrase::new);
    req.create = if create_all {
        CreateFlags::all()
    } else {
        CreateFlags {
            bucket: args.create_bucket,
            lock_table: args.create_lock_table,
            kms_key: args.create_kms_key,
        }
    };
    req.skip_verify = args.skip_verify || config.migrate.skip_verify;
    req.delete_source = args.delete_source;
    req.assume_yes = args.yes;
    req.interactive = !args.non_interactive && !ctx.json && StdinConfirm::available();
    Ok(req)
}

/// `cloud`, a full backend URL, or `s3` filled from flags and config.
fn resolve_side(
    spec: &str,
    args: &MigrateArgs,
    config: &Config,
    region: &str,
) -> anyhow::Result<BackendDescriptor> {
    if spec.trim() != "s3" {
        return Ok(parse_backend(spec, region)?);
    }
    let bucket = args
        .bucket
        .clone()
        .or_else(|| config.backend.bucket.clone())
        .context("an S3 side needs --bucket or backend.bucket in stackshift.yaml")?;
    let lock_table = args
        .lock_table
        .clone()
        .or_else(|| config.backend.lock_table.clone());
    Ok(BackendDescriptor::s3(bucket, region, lock_table)?)
}

fn print_report(report: &MigrationReport) {
    println!(
        "Migration {} of '{}': {} -> {}",
        report.run_id, report.stack, report.source, report.target
    );
    let rows = report
        .steps
        .iter()
        .map(|s| vec![s.state.to_string(), s.outcome.to_string(), s.detail.clone()])
        .collect();
    print_table(&["STEP", "OUTCOME", "DETAIL"], rows);
    print_warnings(&report.warnings);
    if report.succeeded() {
        let stack = report.target_stack.as_deref().unwrap_or(&report.stack);
        println!(
            "Stack '{stack}' now lives on {} (secrets provider: {}).",
            report.target, report.secrets_provider
        );
    }
}
