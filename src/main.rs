//! `chatvault-repair`: run one reconciliation pass over a conversation store.

use std::process::ExitCode;

use chatvault::start::{self, RepairOptions, USAGE};

/// Parse the flags, run the pass and print its summary and findings.
fn main() -> ExitCode {
    start::init_tracing();

    let options = match RepairOptions::from_args(std::env::args().skip(1)) {
        Ok(options) => options,
        Err(err) => {
            tracing::error!("{err}");
            eprintln!("{USAGE}");
            return ExitCode::from(2);
        }
    };

    match start::run_repair(&options) {
        Ok(report) => {
            println!("{report}");
            for finding in &report.findings {
                println!("  - {finding}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!("Repair failed: {err}");
            ExitCode::from(1)
        }
    }
}
