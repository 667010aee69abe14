use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "toggl-sheet-sync",
    version,
    about = "Mirror Toggl time entries into monthly spreadsheet tabs"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile every month of the year into the destination.
    Sync(SyncArgs),
    /// Create month and summary sheets and fill their header rows.
    Setup(SetupArgs),
    /// Show resolved paths, config and environment.
    Status,
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Credentials file for the spreadsheet service.
    #[arg(short = 'c', long)]
    credentials: Option<PathBuf>,

    /// Only mirror entries whose project belongs to this client.
    #[arg(long)]
    client: Option<String>,

    /// Target year; defaults to the current one.
    #[arg(long)]
    year: Option<i32>,

    /// Read entries from a JSON export instead of the Toggl API.
    #[arg(long)]
    entries_file: Option<PathBuf>,

    /// Spreadsheet URL, or a path to a local workbook file.
    destination: String,
}

#[derive(Debug, Args)]
struct SetupArgs {
    #[arg(short = 'c', long)]
    credentials: Option<PathBuf>,

    #[arg(long)]
    year: Option<i32>,

    destination: String,
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let state = if report.ok { "ok" } else { "failed" };
    println!("{}: {state}", report.command);
    for detail in &report.details {
        println!("  {detail}");
    }
    for issue in &report.issues {
        println!("  issue: {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let report = match cli.command {
        Command::Sync(args) => commands::sync::run(&commands::sync::SyncOptions {
            destination: args.destination,
            credentials: args.credentials,
            client: args.client,
            year: args.year,
            entries_file: args.entries_file,
        })?,
        Command::Setup(args) => commands::setup::run(&commands::setup::SetupOptions {
            destination: args.destination,
            credentials: args.credentials,
            year: args.year,
        })?,
        Command::Status => commands::status::run()?,
    };

    render(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
