pub mod commands;
pub mod input;
pub mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use commands::normalize::NormalizeArgs;
use commands::run::RunArgs;

#[derive(Debug, Parser)]
#[command(
    name = "commitpilot",
    about = "Commitment purchase pipeline CLI",
    long_about = "Normalize provider recommendations, reconcile them against owned commitments, scale to the target coverage and purchase in rate-limited batches.",
    after_help = "Examples:\n  commitpilot run --input recommendations.json\n  commitpilot run --input recommendations.json --services rds,elasticache --coverage 60\n  commitpilot normalize --input recommendations.json --service ec2\n  commitpilot config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Run the full pipeline for every configured service (dry run unless --live)")]
    Run(RunArgs),
    #[command(about = "Normalize one service's recommendations and report skipped records")]
    Normalize(NormalizeArgs),
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config {
        #[arg(long, help = "Config file to read instead of the default locations")]
        config: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Run(args) => commands::run::run(&args),
        Command::Normalize(args) => commands::normalize::run(&args),
        Command::Config { config } => commands::config::run(config.as_deref()),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
