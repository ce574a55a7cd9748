//! Command-line front end for courier
//!
//! - `courier send` sends every file to every recipient and prints the totals
//! - `courier check` validates the configuration

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use courier::{Batch, Courier, find_config_file};
use courier_common::{internal, logging};

/// Send pre-formatted mail through Amazon SES
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send pre-formatted mail through Amazon SES", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (overrides COURIER_CONFIG and the default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send raw RFC 5322 files
    Send {
        /// Envelope sender
        #[arg(long)]
        sender: String,

        /// Envelope recipient, may be repeated
        #[arg(long = "recipient", required = true)]
        recipients: Vec<String>,

        /// Files holding a header block, a blank line and a body
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Validate the configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init();

    let config_path = match cli.config {
        Some(path) => path,
        None => find_config_file()?,
    };
    let courier = Courier::load(&config_path)?;
    internal!(level = DEBUG, path = %config_path.display(), "Loaded configuration");

    match cli.command {
        Commands::Check => {
            let credentials = courier.ses.credentials()?;
            println!(
                "Configuration OK: {} ({:?}, concurrency limit {})",
                credentials.endpoint(),
                courier.ses.mode,
                courier.ses.bounded_concurrency_limit()
            );
            Ok(ExitCode::SUCCESS)
        }
        Commands::Send {
            sender,
            recipients,
            files,
        } => {
            let batch = Batch {
                sender,
                recipients,
                files,
            };
            let report = batch.run(courier.dispatcher()?).await?;

            println!(
                "Sent {} messages: {} refused, concurrent successes: {}, failures: {}",
                report.attempted, report.refused, report.totals.success, report.totals.failure
            );

            if report.failures() == 0 {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
