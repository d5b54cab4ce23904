//! `dicom-transfer` command line tool.
//!
//! Exit code 0 means every study and file was transferred; 1 means an invalid
//! invocation, a run-level error, or at least one failed study or file.

mod args;
mod commands;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use dicom_transfer_storage::{StorageSettings, TransferMetrics};

use args::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli: Cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let _log_guard = match logging::init(cli.verbose, &cli.log_file) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    let settings: StorageSettings = cli.storage_settings();
    let metrics: Arc<TransferMetrics> = match TransferMetrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(err) => {
            tracing::error!(error = %err, "failed to create transfer metrics");
            eprintln!("error: failed to create transfer metrics: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result: anyhow::Result<bool> = match cli.command {
        Command::Upload(args) => commands::upload(args, settings, Arc::clone(&metrics)).await,
        Command::Download(args) => commands::download(args, settings, Arc::clone(&metrics)).await,
    };

    tracing::info!("{}", metrics.report());

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            tracing::error!("transfer finished with failures");
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
