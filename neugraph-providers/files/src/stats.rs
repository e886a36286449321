//! Plain-text statistics files.

use std::{fs, path::Path};

use neugraph_core::StatsVector;

use crate::errors::GraphFileError;

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ':' | ';' | '=')
}

/// Reads every numeric token of `text`, in order, into a [`StatsVector`].
///
/// Tokens are split on whitespace, `,`, `:`, `;` and `=`; tokens that are
/// not numbers (field names, for instance) are ignored. `nan` is accepted
/// and marks a missing statistic.
///
/// # Errors
/// Returns [`GraphFileError::Stats`] unless exactly
/// [`neugraph_core::STATS_DIM`] numbers are found.
///
/// # Examples
/// ```
/// use neugraph_providers_files::parse_stats;
///
/// let stats = parse_stats("nodes: 4, edges: 3\n0.5 1.5 0 1 2 3 4 5 6 7 8 9")?;
/// assert_eq!(stats.as_slice()[..3], [4.0, 3.0, 0.5]);
/// # Ok::<(), neugraph_providers_files::GraphFileError>(())
/// ```
pub fn parse_stats(text: &str) -> Result<StatsVector, GraphFileError> {
    let values: Vec<f32> = text
        .split(is_separator)
        .filter_map(|token| token.parse::<f32>().ok())
        .collect();
    Ok(StatsVector::try_from(values)?)
}

/// Reads and parses the statistics file at `path`.
///
/// # Errors
/// Returns [`GraphFileError::Io`] when the file cannot be read and the
/// [`parse_stats`] error, tagged with the path, otherwise.
pub fn read_stats(path: &Path) -> Result<StatsVector, GraphFileError> {
    let text = fs::read_to_string(path).map_err(|source| GraphFileError::io(path, source))?;
    parse_stats(&text).map_err(|err| err.in_file(path))
}
