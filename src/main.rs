use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;
mod conditions;
mod config;
mod documents;
mod engine;
mod error;
mod gateway;
mod navigator;
mod output;
mod session;
mod tasks;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("ruralplan=debug")
        } else {
            EnvFilter::new("ruralplan=info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => cli::run::execute(args).await,
        Commands::Check(args) => cli::check::execute(args),
        Commands::Schema => cli::schema::execute(),
        Commands::VerdictSchema => cli::schema::execute_verdict(),
    }
}
