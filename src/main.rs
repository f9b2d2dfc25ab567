//! Binary entry point: parses flags, wires up logging, runs the CLI driver,
//! and maps the closed error type to a process exit code (§4.H, §6, §7).

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use schemalign::cli::{self, Cli};
use schemalign::logging;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        cli::print_completions(shell);
        return ExitCode::SUCCESS;
    }

    if let Err(err) = logging::init_logging(cli.verbose, cli.quiet, None) {
        eprintln!("failed to initialize logging: {err:#}");
        return ExitCode::FAILURE;
    }

    match cli::run(&cli).context("schemalign run failed") {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            let code = err
                .downcast_ref::<schemalign::SchemaAlignError>()
                .map_or(1, schemalign::SchemaAlignError::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
    }
}
