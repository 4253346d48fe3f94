use crate::cmd::{region, Context};
use crate::output::print_json;
use anyhow::Context as _;
use clap::Subcommand;
use stackshift_core::config::{Config, WarnLevel};
use stackshift_core::paths;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Write a starter stackshift.yaml in the workspace
    Init {
        /// Region to record (default: AWS_REGION, then us-east-1)
        #[arg(long)]
        region: Option<String>,
    },

    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,
}

pub fn run(ctx: &Context, subcmd: ConfigSubcommand) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Init { region: flag } => init(ctx, flag.as_deref()),
        ConfigSubcommand::Show => show(ctx),
        ConfigSubcommand::Validate => validate(ctx),
    }
}

fn init(ctx: &Context, flag: Option<&str>) -> anyhow::Result<()> {
    let region = region(flag, &Config::default());
    let path = paths::config_path(&ctx.workspace);
    let written = Config::init(&ctx.workspace, &region)
        .with_context(|| format!("failed to write {}", path.display()))?;
    if ctx.json {
        print_json(&serde_json::json!({
            "path": path.display().to_string(),
            "created": written,
        }))?;
    } else if written {
        println!("Created {}", path.display());
    } else {
        println!("{} already exists; left unchanged", path.display());
    }
    Ok(())
}

fn show(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.config()?;
    if ctx.json {
        print_json(&config)?;
    } else {
        print!("{}", serde_yaml::to_string(&config)?);
    }
    Ok(())
}

fn validate(ctx: &Context) -> anyhow::Result<()> {
    let config = ctx.config()?;
    let warnings = config.validate();

    if ctx.json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    let has_errors = warnings.iter().any(|w| w.level == WarnLevel::Error);
    if has_errors {
        anyhow::bail!("config validation found errors");
    }

    Ok(())
}
