pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "wayfarer",
    about = "Wayfarer operator CLI",
    long_about = "Operate Wayfarer migrations, fixture seeding, spend inspection, and readiness checks.",
    after_help = "Examples:\n  wayfarer doctor --json\n  wayfarer status\n  wayfarer chat \"Plan 3 days in Athens\" --destination Athens --tier mid\n  wayfarer reset-month 2025-06"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Send one message through the orchestrator and print the turn outcome")]
    Chat {
        #[arg(help = "The user message")]
        message: String,
        #[arg(long, help = "Session identifier (a fresh UUID when omitted)")]
        session: Option<String>,
        #[arg(long, help = "Destination city for the planning context")]
        destination: Option<String>,
        #[arg(long, help = "Destination country")]
        country: Option<String>,
        #[arg(long, help = "Trip start date (YYYY-MM-DD)")]
        start_date: Option<String>,
        #[arg(long, help = "Trip end date (YYYY-MM-DD)")]
        end_date: Option<String>,
        #[arg(long, help = "Budget tier: budget, mid, or premium")]
        tier: Option<String>,
    },
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the static hotel fixture catalog used by the stub provider")]
    Seed,
    #[command(about = "Show monthly spend state, recent usage, and cache counters")]
    Status,
    #[command(about = "Validate config, LLM key readiness, and DB connectivity checks")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Delete every usage record for one month (admin escape hatch)")]
    ResetMonth {
        #[arg(help = "Month bucket in YYYY-MM form")]
        month: String,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Chat { message, session, destination, country, start_date, end_date, tier } => {
            commands::chat::run(commands::chat::ChatArgs {
                message,
                session,
                destination,
                country,
                start_date,
                end_date,
                tier,
            })
        }
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Status => commands::status::run(),
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::ResetMonth { month } => commands::reset_month::run(&month),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
