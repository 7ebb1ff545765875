pub mod check;
pub mod run;
pub mod schema;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ruralplan")]
#[command(
    author,
    version,
    about = "Drafts village development plans with LLM writers and reviewers until every section is approved"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Draft and review the plan until it converges
    Run(RunArgs),

    /// Validate config and list documents, tasks and routes without calling any model
    Check(CheckArgs),

    /// Print JSON Schema for config validation
    Schema,

    /// Print JSON Schema of the structured review verdict
    VerdictSchema,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    /// Path to config file
    #[arg(short, long, default_value = "ruralplan.yaml")]
    pub config: PathBuf,

    /// Override the village name
    #[arg(long)]
    pub village: Option<String>,

    /// Override the documents directory
    #[arg(long)]
    pub documents: Option<PathBuf>,

    /// Override output directory
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Override the generation model
    #[arg(long, env = "RURALPLAN_MODEL")]
    pub model: Option<String>,

    /// Override the review model
    #[arg(long)]
    pub review_model: Option<String>,

    /// Override max in-flight model calls
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Override the iteration budget
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Abort the loop after this many seconds
    #[arg(long)]
    pub deadline_sec: Option<u64>,

    /// Continue from the session checkpoint in the output directory
    #[arg(long)]
    pub resume: bool,

    /// Show plan without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Exit 1 if the plan does not converge (CI mode)
    #[arg(long)]
    pub fail_on_abort: bool,
}

#[derive(Parser, Clone)]
pub struct CheckArgs {
    /// Path to config file
    #[arg(short, long, default_value = "ruralplan.yaml")]
    pub config: PathBuf,

    /// Override the documents directory
    #[arg(long)]
    pub documents: Option<PathBuf>,
}
