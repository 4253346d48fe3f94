use crate::cmd::{region, Context};
use crate::output::print_json;
use anyhow::Context as _;
use clap::Subcommand;
use stackshift_core::backend::validate_region;
use stackshift_core::eks::allow_cidrs;

#[derive(Subcommand)]
pub enum EksSubcommand {
    /// Allow CIDR blocks to reach the cluster's public API endpoint
    AllowCidrs {
        /// Cluster name
        #[arg(long)]
        cluster: String,

        /// CIDR blocks (a bare address means /32)
        #[arg(required = true, num_args = 1..)]
        cidrs: Vec<String>,

        /// Set the list to exactly these CIDRs instead of adding to it
        #[arg(long)]
        replace: bool,

        /// AWS region (default: AWS_REGION, then stackshift.yaml, then us-east-1)
        #[arg(long)]
        region: Option<String>,
    },
}

pub fn run(ctx: &Context, subcmd: EksSubcommand) -> anyhow::Result<()> {
    match subcmd {
        EksSubcommand::AllowCidrs {
            cluster,
            cidrs,
            replace,
            region: flag,
        } => {
            let config = ctx.config()?;
            let region = region(flag.as_deref(), &config);
            validate_region(&region)?;

            let mut runner = ctx.runner();
            let update = allow_cidrs(&mut runner, &cluster, &region, &cidrs, replace)
                .with_context(|| format!("failed to update cluster '{cluster}'"))?;

            if ctx.json {
                print_json(&update)?;
            } else if update.updated {
                println!("Updated '{}' public access CIDRs:", update.cluster);
                for cidr in &update.after {
                    let marker = if update.before.contains(cidr) { " " } else { "+" };
                    println!("  {marker} {cidr}");
                }
                for cidr in update.before.iter().filter(|c| !update.after.contains(c)) {
                    println!("  - {cidr}");
                }
            } else {
                println!("'{}' already allows {}", update.cluster, update.after.join(", "));
            }
            Ok(())
        }
    }
}
