//! Support library for the neugraph CLI binary.
//!
//! Exposes the command pipeline and logging set-up so integration tests can
//! drive both without spawning a subprocess.

pub mod cli;
pub mod logging;
