mod cmd;
mod output;
mod prompt;
mod root;

use clap::{error::ErrorKind, Parser, Subcommand};
use cmd::{
    backend::BackendSubcommand, config::ConfigSubcommand, ecs::EcsSubcommand,
    eks::EksSubcommand, env::EnvSubcommand, migrate::MigrateArgs, provision::ProvisionArgs,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "stackshift",
    about = "Move Pulumi stacks between Pulumi Cloud and S3, and provision the AWS state backend",
    version,
    propagate_version = true
)]
struct Cli {
    /// Pulumi project directory (default: nearest Pulumi.yaml or stackshift.yaml upwards)
    #[arg(long, global = true, env = "STACKSHIFT_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log every external command
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Migrate a stack between Pulumi Cloud and an S3 backend
    Migrate(MigrateArgs),

    /// Create or check the S3 bucket, lock table and KMS key for a state backend
    Provision(ProvisionArgs),

    /// Build or inspect backend URLs
    Backend {
        #[command(subcommand)]
        subcommand: BackendSubcommand,
    },

    /// Push .env values into stack config or SSM
    Env {
        #[command(subcommand)]
        subcommand: EnvSubcommand,
    },

    /// EKS cluster access
    Eks {
        #[command(subcommand)]
        subcommand: EksSubcommand,
    },

    /// ECS task definitions
    Ecs {
        #[command(subcommand)]
        subcommand: EcsSubcommand,
    },

    /// Manage stackshift.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else if cli.quiet {
        tracing::Level::ERROR
    } else {
        match &cli.command {
            Commands::Migrate(_) | Commands::Provision(_) => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let workspace = root::resolve_workspace(cli.workspace.as_deref());
    let ctx = cmd::Context {
        workspace,
        json: cli.json,
        verbose: cli.verbose,
    };

    let result = match cli.command {
        Commands::Migrate(args) => cmd::migrate::run(&ctx, args),
        Commands::Provision(args) => cmd::provision::run(&ctx, args),
        Commands::Backend { subcommand } => cmd::backend::run(&ctx, subcommand),
        Commands::Env { subcommand } => cmd::env::run(&ctx, subcommand),
        Commands::Eks { subcommand } => cmd::eks::run(&ctx, subcommand),
        Commands::Ecs { subcommand } => cmd::ecs::run(&ctx, subcommand),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
