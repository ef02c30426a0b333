mod commands;
mod generator;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "crucible-cli")]
#[command(about = "Crucible CLI - Run Rust snippets against challenge tests locally", long_about = None)]
struct Cli {
    /// Show pipeline logs on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile and run a snippet, printing the result as JSON
    Run {
        /// Rust source file
        #[arg(short, long)]
        code: PathBuf,

        /// JSON array of { "description", "test" } objects
        #[arg(short, long)]
        tests: Option<PathBuf>,

        /// Execution timeout in milliseconds (overrides config)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Runner config file (defaults to config/runner.json)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the synthesized harness without compiling it
    Harness {
        /// Rust source file
        #[arg(short, long)]
        code: PathBuf,

        /// JSON array of { "description", "test" } objects
        #[arg(short, long)]
        tests: Option<PathBuf>,
    },

    /// Write a default config/runner.json and a sample challenge
    Init {
        /// Project path
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            code,
            tests,
            timeout_ms,
            config,
        } => {
            let success =
                commands::run_snippet(&code, tests.as_deref(), timeout_ms, config.as_deref())
                    .await?;
            if !success {
                std::process::exit(1);
            }
        }
        Commands::Harness { code, tests } => {
            commands::print_harness(&code, tests.as_deref())?;
        }
        Commands::Init { path } => {
            commands::init_project(&path)?;
        }
    }

    Ok(())
}
