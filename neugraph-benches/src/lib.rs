//! Benchmark support crate for neugraph.
//!
//! Provides seeded random graphs, conditioning vectors and parameter types
//! used by the Criterion benchmarks for canonicalisation and reverse
//! diffusion sampling.

pub mod error;
pub mod params;
pub mod source;
