//! Command-line interface for training the generator and sampling graphs.
//!
//! `run` executes the whole pipeline over a corpus directory; `generate`
//! restores both checkpoints and samples graphs for explicit statistics
//! files.

mod commands;

pub use commands::{
    Cli, CliError, Command, DEFAULT_CACHE_FILE, ExecutionSummary, GenerateCommand, ModelArgs,
    RunCommand, TrainingArgs, render_summary, run_cli,
};

#[cfg(test)]
mod tests;
