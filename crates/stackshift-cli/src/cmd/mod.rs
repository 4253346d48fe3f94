pub mod backend;
pub mod config;
pub mod ecs;
pub mod eks;
pub mod env;
pub mod migrate;
pub mod provision;

use anyhow::Context as _;
use stackshift_core::backend::resolve_region;
use stackshift_core::config::Config;
use stackshift_core::exec::ProcessRunner;
use std::path::PathBuf;

/// Global options shared by every subcommand.
pub struct Context {
    pub workspace: PathBuf,
    pub json: bool,
    pub verbose: bool,
}

impl Context {
    pub fn config(&self) -> anyhow::Result<Config> {
        Config::load(&self.workspace).context("failed to load stackshift.yaml")
    }

    pub fn runner(&self) -> ProcessRunner {
        ProcessRunner::new(self.verbose)
    }
}

/// `--region`, then `AWS_REGION`, then the config file, then `us-east-1`.
pub fn region(flag: Option<&str>, config: &Config) -> String {
    resolve_region(flag, config.region.as_deref())
}
