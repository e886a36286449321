//! CLI entry point for the neugraph generator.
//!
//! Logging comes up first; any failure after that is logged once with the
//! stable codes of the core error, if there is one, and turned into a
//! failing exit status.

use std::io::{self, BufWriter, Write};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, field};

use neugraph_cli::{
    cli::{Cli, CliError, render_summary, run_cli},
    logging::{LoggingError, init_logging},
};

fn main() -> ExitCode {
    if let Err(err) = init_logging() {
        report_logging_init_error(&err);
        return ExitCode::FAILURE;
    }
    match execute(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let (code, detail_code) = core_codes(&err);
            error!(
                error = %format_args!("{err:#}"),
                code = code.map(field::display),
                detail_code = detail_code.map(field::display),
                "neugraph failed"
            );
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> anyhow::Result<()> {
    let summary = run_cli(cli).context("command failed")?;
    let mut out = BufWriter::new(io::stdout().lock());
    render_summary(&summary, &mut out).context("could not write the summary")?;
    out.flush().context("could not flush stdout")
}

/// Top-level and detail codes of a core failure.
fn core_codes(err: &anyhow::Error) -> (Option<&'static str>, Option<&'static str>) {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Core(core)) => (Some(core.code().as_str()), core.detail_code()),
        _ => (None, None),
    }
}

#[expect(
    clippy::print_stderr,
    reason = "logging is unavailable when its initialisation fails"
)]
fn report_logging_init_error(err: &LoggingError) {
    eprintln!("neugraph: cannot initialise logging: {err}");
}
