use crate::cmd::{region, Context};
use crate::output::print_json;
use clap::Subcommand;
use stackshift_core::backend::{build_s3_url, parse_backend, validate_region, BackendDescriptor};

#[derive(Subcommand)]
pub enum BackendSubcommand {
    /// Print the login URL for an S3 backend
    Url {
        /// State bucket
        #[arg(long)]
        bucket: String,
        /// AWS region (default: AWS_REGION, then stackshift.yaml, then us-east-1)
        #[arg(long)]
        region: Option<String>,
        /// DynamoDB lock table
        #[arg(long)]
        lock_table: Option<String>,
    },

    /// Decompose a backend URL into its parts
    Parse {
        /// `cloud`, the Pulumi Cloud URL, or an s3:// URL
        url: String,
        /// Region used when the URL has none
        #[arg(long)]
        region: Option<String>,
    },
}

pub fn run(ctx: &Context, subcmd: BackendSubcommand) -> anyhow::Result<()> {
    let config = ctx.config()?;
    match subcmd {
        BackendSubcommand::Url {
            bucket,
            region: flag,
            lock_table,
        } => {
            let region = region(flag.as_deref(), &config);
            validate_region(&region)?;
            let backend = BackendDescriptor::s3(&bucket, &region, lock_table)?;
            let url = build_s3_url(&bucket, &region, backend.lock_table());
            if ctx.json {
                print_json(&serde_json::json!({ "url": url, "backend": backend }))?;
            } else {
                println!("{url}");
            }
        }
        BackendSubcommand::Parse { url, region: flag } => {
            let region = region(flag.as_deref(), &config);
            let backend = parse_backend(&url, &region)?;
            if ctx.json {
                print_json(&backend)?;
            } else {
                print_backend(&backend);
            }
        }
    }
    Ok(())
}

fn print_backend(backend: &BackendDescriptor) {
    match backend {
        BackendDescriptor::Cloud => {
            println!("type:       cloud");
            println!("url:        {}", backend.login_url());
        }
        BackendDescriptor::S3 {
            bucket,
            region,
            lock_table,
        } => {
            println!("type:       s3");
            println!("bucket:     {bucket}");
            println!("region:     {region}");
            println!("lock_table: {}", lock_table.as_deref().unwrap_or("-"));
        }
    }
}
