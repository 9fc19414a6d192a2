use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::commands::{self, CommandReport};
use crate::logging;

#[derive(Debug, Parser)]
#[command(
    name = "firefighter-report",
    version,
    about = "Summarize firefighter Slack threads and post a report"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the report once.
    Run(RunArgs),
    /// Validate settings and print the effective configuration.
    Check {
        #[arg(long)]
        json: bool,
    },
    /// Print the channel and thread timestamp encoded in a permalink.
    ParsePermalink {
        url: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Summarize and cache, but post nothing.
    #[arg(long, conflicts_with = "no_dry_run")]
    dry_run: bool,
    /// Post even if DRY_RUN is set.
    #[arg(long)]
    no_dry_run: bool,
    /// Report on this single thread instead of searching.
    #[arg(long)]
    permalink: Option<String>,
    #[arg(long)]
    json: bool,
}

impl RunArgs {
    fn dry_run_override(&self) -> Option<bool> {
        match (self.dry_run, self.no_dry_run) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

fn emit(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{}", report.render_text());
    }
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    match cli.command {
        Command::Run(args) => {
            let report = commands::run_report::run(&commands::run_report::RunReportOptions {
                dry_run: args.dry_run_override(),
                permalink: args.permalink.clone(),
            })?;
            emit(&report, args.json)
        }
        Command::Check { json } => emit(&commands::check::run()?, json),
        Command::ParsePermalink { url, json } => {
            emit(&commands::parse_permalink::run(&url)?, json)
        }
    }
}
