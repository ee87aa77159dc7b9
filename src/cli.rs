use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "querysync")]
#[command(version)]
#[command(about = "Declarative sync of hosted queries and materialized views", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Desired-state config file
    #[arg(short, long, global = true, default_value = "querysync.toml")]
    pub config: PathBuf,

    /// API key for the query service
    #[arg(long, global = true, env = "QUERYSYNC_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Print machine-readable JSON instead of formatted output
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Converge remote queries and materialized views to the config
    Apply(ApplyArgs),

    /// Show what apply would do, without calling the remote
    Plan,

    /// Report drift between the config and the remote
    Status(PassArgs),

    /// Archive every managed query and delete every managed view
    Destroy(DestroyArgs),

    /// Print the content fingerprint of a SQL file
    Fingerprint {
        /// SQL file, or `-` for stdin
        file: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Pass options
// ============================================================================

/// Overrides for `[settings]` shared by every command that talks to the remote
#[derive(Args, Default)]
pub struct PassArgs {
    /// Number of parallel workers per tier
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Per-request timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Dry run - print the plan and make no remote calls
    #[arg(short, long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub pass: PassArgs,
}

#[derive(Args)]
pub struct DestroyArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub pass: PassArgs,
}
