use crate::cmd::{region, Context};
use crate::output::{print_json, print_table, print_warnings};
use anyhow::Context as _;
use clap::Args;
use serde::Serialize;
use stackshift_core::backend::{build_s3_url, validate_region};
use stackshift_core::provision::{self, Ensured, ResourceSpec};

#[derive(Args)]
pub struct ProvisionArgs {
    /// State bucket (default: backend.bucket in stackshift.yaml)
    #[arg(long)]
    bucket: Option<String>,

    /// DynamoDB lock table
    #[arg(long)]
    lock_table: Option<String>,

    /// KMS alias for stack secrets
    #[arg(long)]
    kms_alias: Option<String>,

    /// AWS region (default: AWS_REGION, then stackshift.yaml, then us-east-1)
    #[arg(long)]
    region: Option<String>,

    /// Only report what exists; create nothing
    #[arg(long)]
    check: bool,
}

#[derive(Serialize)]
struct ResourceRow {
    resource: String,
    #[serde(flatten)]
    status: Ensured,
}

#[derive(Serialize)]
struct ProvisionOutput {
    caller: String,
    region: String,
    backend_url: String,
    resources: Vec<ResourceRow>,
}

pub fn run(ctx: &Context, args: ProvisionArgs) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let region = region(args.region.as_deref(), &config);
    validate_region(&region)?;

    let bucket = args
        .bucket
        .or(config.backend.bucket.clone())
        .context("--bucket is required (or set backend.bucket in stackshift.yaml)")?;
    let lock_table = args.lock_table.or(config.backend.lock_table.clone());
    let kms_alias = args.kms_alias.or(config.backend.kms_alias.clone());

    let mut specs = vec![ResourceSpec::bucket(&bucket, &region)];
    if let Some(table) = &lock_table {
        specs.push(ResourceSpec::lock_table(table, &region));
    }
    if let Some(alias) = &kms_alias {
        specs.push(ResourceSpec::kms_alias(alias, &region));
    }

    let mut runner = ctx.runner();
    let caller = provision::check_credentials(&mut runner).context("AWS credentials check failed")?;

    let mut resources = Vec::new();
    let mut warnings = Vec::new();
    for spec in &specs {
        let status = provision::ensure(&mut runner, spec, !args.check)
            .with_context(|| format!("failed to provision {spec}"))?;
        if let Ensured::Created(created) = &status {
            warnings.extend(created.warnings.iter().cloned());
        }
        resources.push(ResourceRow {
            resource: spec.to_string(),
            status,
        });
    }

    let out = ProvisionOutput {
        caller,
        backend_url: build_s3_url(&bucket, &region, lock_table.as_deref()),
        region,
        resources,
    };

    if ctx.json {
        print_json(&out)?;
    } else {
        let rows = out
            .resources
            .iter()
            .map(|r| {
                let status = match &r.status {
                    Ensured::Present { .. } => "present",
                    Ensured::Created(_) => "created",
                    Ensured::Absent => "missing",
                };
                let id = r.status.id().unwrap_or("").to_string();
                vec![r.resource.clone(), status.to_string(), id]
            })
            .collect();
        print_table(&["RESOURCE", "STATUS", "ID"], rows);
        print_warnings(&warnings);
        println!("Backend URL: {}", out.backend_url);
    }

    let missing = out
        .resources
        .iter()
        .filter(|r| !r.status.is_available())
        .count();
    if missing > 0 && args.check {
        anyhow::bail!("{missing} resource(s) missing");
    }
    Ok(())
}
