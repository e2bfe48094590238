//! Flotilla: propagate a template across a fleet of hosted functions.
//!
//! # Usage
//!
//! ```text
//! flotilla update [template] -s <sub> [-c key=value]... [-u b/f] [-i include] [-p path]
//!                 [-d] [-f] [-n] [-t hooks.yaml] [-w workers] [--profile name]
//! flotilla diff   [template] -s <sub> [-c key=value]... [-u b/f] [-i include] [-p path]
//! flotilla migrate <source-profile> <dest-profile> [-s sub] [-d sub] -c key=value... [-n]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, migrate::MigrateArgs, update::UpdateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "flotilla",
    version,
    about = "Propagate template changes across a fleet of hosted functions",
    long_about = None,
)]
struct Cli {
    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Push template files into every matching function.
    Update(UpdateArgs),

    /// Show how each matching function differs from the template.
    Diff(DiffArgs),

    /// Copy matching functions from one profile's subscription to another.
    Migrate(MigrateArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Update(args) => args.run().await,
        Commands::Diff(args) => args.run().await,
        Commands::Migrate(args) => args.run().await,
    }
}

/// Logs go to stderr; stdout carries only reports.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
