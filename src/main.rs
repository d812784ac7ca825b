//! L4S Testbed Harness - Main CLI Application
//!
//! Parses the command line, builds the application and maps failures to
//! exit codes.

use clap::Parser;
use l4s_testbed::{app::App, cli::Cli, error::ErrorReporter, AppError};
use std::process;

fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Please report this issue together with the command line that triggered it.");
        process::exit(99);
    }));

    // The runtime is gone once `run` returns, so interrupted jobs and their children are dropped first
    let code = run();
    if code != 0 {
        process::exit(code);
    }
}

#[tokio::main]
async fn run() -> i32 {
    // Wrong argument counts exit with clap's usage message and status 2
    let cli = Cli::parse();
    let reporter = ErrorReporter::new(cli.use_colors(), cli.verbose || cli.debug);

    let result = match App::new(cli) {
        Ok(app) => app.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            reporter.report_error(&e);
            print_error_suggestions(&e);
            e.exit_code()
        }
    }
}

/// Print helpful suggestions for common errors
fn print_error_suggestions(error: &AppError) {
    match error {
        AppError::Config(_) => {
            eprintln!();
            eprintln!("Configuration help:");
            eprintln!("  - Check the L4ST_* variables and your .env file");
            eprintln!("  - Run `l4st --help-topic env` for the supported variables");
        }
        AppError::Usage(_) => {
            eprintln!();
            eprintln!("Run `l4st <COMMAND> --help` for the expected arguments.");
        }
        AppError::Command(_) => {
            eprintln!();
            eprintln!("Command troubleshooting:");
            eprintln!("  - Check that iperf3, tc and ss are installed (or set L4ST_*_BIN)");
            eprintln!("  - Check that the iperf3 server is started and reachable");
        }
        AppError::Analysis(_) => {
            eprintln!();
            eprintln!("Analysis help:");
            eprintln!("  - Check --dir and the index range");
            eprintln!("  - Run `l4st --help-topic files` for the expected file names");
        }
        _ => {}
    }
}
