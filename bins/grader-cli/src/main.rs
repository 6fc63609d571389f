mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "grader-cli")]
#[command(about = "Grader CLI - Set up, check and inspect grading runs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the grading directory layout with a sample suite file
    Init {
        /// Grading directory
        #[arg(short, long, default_value = ".")]
        path: String,
    },

    /// Check a suite file for problems before grading with it
    Validate {
        /// Suite file
        #[arg(short, long, default_value = "tests/suite.json")]
        suite: String,
    },

    /// Print a results file as a readable report
    Show {
        /// Results file
        #[arg(short, long, default_value = "results/results.json")]
        results: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path } => {
            commands::init_project(&path)?;
        }
        Commands::Validate { suite } => {
            commands::validate_suite(&suite)?;
        }
        Commands::Show { results } => {
            commands::show_results(&results)?;
        }
    }

    Ok(())
}
