pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "crmquery",
    about = "Natural-language CRM query CLI",
    long_about = "Run natural-language CRM queries, inspect effective configuration, and check readiness.",
    after_help = "Examples:\n  crmquery ask \"show me top 5 leads sorted by name\"\n  crmquery doctor --json\n  crmquery config"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Translate a natural-language query, run it against the CRM and print the envelope"
    )]
    Ask {
        #[arg(required = true, num_args = 1.., help = "Natural-language query text")]
        query: Vec<String>,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, LLM endpoint resolution, and resource path writability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { query } => commands::ask::run(&query.join(" ")),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
