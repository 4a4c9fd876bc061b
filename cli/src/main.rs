mod chart;
mod commands;
mod config;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{LogArgs, cmd_day, cmd_export, cmd_import, cmd_log, cmd_show};
use crate::config::Config;
use glyco_core::service::GlucoseService;

#[derive(Parser)]
#[command(
    name = "glyco",
    version,
    about = "A daily blood-glucose log",
    long_about = "A daily blood-glucose log.\n\n\
        Records up to three readings per day (fasting, two hours after a meal, \
        bedtime) in mmol/L and shows the history as a table and a line chart."
)]
struct Cli {
    /// Path to the database file (default: platform data directory)
    #[arg(long, global = true, env = "GLYCO_DB", value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record the readings for a day, replacing whatever was stored for it
    Log {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Fasting reading in mmol/L
        #[arg(short, long)]
        fasting: Option<f64>,
        /// Reading two hours after a meal in mmol/L
        #[arg(short, long)]
        postprandial: Option<f64>,
        /// Bedtime reading in mmol/L
        #[arg(short, long)]
        bedtime: Option<f64>,
        /// Keep stored readings for this day that are not given here
        #[arg(long)]
        merge: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the full history as a table and chart
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the readings for one day (default: today)
    Day {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Export the history as CSV
    Export {
        /// Output file (default: stdout)
        file: Option<PathBuf>,
    },
    /// Import readings from a CSV file
    Import {
        /// Path to the CSV file
        file: PathBuf,
        /// Preview import without making changes
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the JSON API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

fn init_tracing(serving: bool) {
    let default_level = if serving { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(matches!(cli.command, Commands::Serve { .. }));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    tracing::debug!(path = %config.db_path.display(), "opening glucose database");
    let svc = GlucoseService::open(&config.db_path)?;

    match cli.command {
        Commands::Log {
            date,
            fasting,
            postprandial,
            bedtime,
            merge,
            json,
        } => cmd_log(
            &svc,
            LogArgs {
                date,
                fasting,
                postprandial,
                bedtime,
                merge,
                json,
            },
        ),
        Commands::Show { json } => cmd_show(&svc, json),
        Commands::Day { date, json } => cmd_day(&svc, date, json),
        Commands::Export { file } => cmd_export(&svc, file.as_deref()),
        Commands::Import {
            file,
            dry_run,
            json,
        } => cmd_import(&svc, &file, dry_run, json),
        Commands::Serve { port, bind } => server::start_server(svc, port, &bind).await,
    }
}
