use crate::cmd::{region, Context};
use crate::output::{print_json, print_table};
use anyhow::Context as _;
use clap::Subcommand;
use stackshift_core::backend::validate_region;
use stackshift_core::ecs::list_images;

#[derive(Subcommand)]
pub enum EcsSubcommand {
    /// List the container images of every active task definition
    Images {
        /// Only task definition families starting with this prefix
        #[arg(long)]
        family_prefix: Option<String>,

        /// AWS region (default: AWS_REGION, then stackshift.yaml, then us-east-1)
        #[arg(long)]
        region: Option<String>,
    },
}

pub fn run(ctx: &Context, subcmd: EcsSubcommand) -> anyhow::Result<()> {
    match subcmd {
        EcsSubcommand::Images {
            family_prefix,
            region: flag,
        } => {
            let config = ctx.config()?;
            let region = region(flag.as_deref(), &config);
            validate_region(&region)?;

            let mut runner = ctx.runner();
            let rows = list_images(&mut runner, &region, family_prefix.as_deref())
                .context("failed to list task definitions")?;

            if ctx.json {
                print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No active task definitions.");
            } else {
                let table = rows
                    .into_iter()
                    .map(|r| vec![r.family, r.revision.to_string(), r.container, r.image])
                    .collect();
                print_table(&["FAMILY", "REVISION", "CONTAINER", "IMAGE"], table);
            }
            Ok(())
        }
    }
}
