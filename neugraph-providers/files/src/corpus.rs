//! Corpus directories pairing graph files with statistics files.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use neugraph_core::{Graph, GraphRecord};
use tracing::{info, instrument, warn};

use crate::{errors::GraphFileError, gexf::parse_gexf, gml::parse_gml, stats::read_stats};

/// Sub-directory holding graph files.
pub const GRAPHS_DIR: &str = "graphs";
/// Sub-directory holding one `<stem>.txt` statistics file per graph.
pub const STATS_DIR: &str = "stats";

/// Supported graph file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphFormat {
    /// Graph Modelling Language, `.gml`.
    Gml,
    /// Graph Exchange XML Format, `.gexf`.
    Gexf,
}

impl GraphFormat {
    /// Infers the format from the file extension, ignoring case.
    ///
    /// # Examples
    /// ```
    /// use std::path::Path;
    /// use neugraph_providers_files::GraphFormat;
    ///
    /// assert_eq!(GraphFormat::from_path(Path::new("a/ring.GML")), Some(GraphFormat::Gml));
    /// assert_eq!(GraphFormat::from_path(Path::new("notes.txt")), None);
    /// ```
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?;
        if extension.eq_ignore_ascii_case("gml") {
            Some(Self::Gml)
        } else if extension.eq_ignore_ascii_case("gexf") {
            Some(Self::Gexf)
        } else {
            None
        }
    }

    /// Parses `text` in this format.
    ///
    /// # Errors
    /// Returns the reader's [`GraphFileError`].
    pub fn parse(self, text: &str) -> Result<Graph, GraphFileError> {
        match self {
            Self::Gml => parse_gml(text),
            Self::Gexf => parse_gexf(text),
        }
    }
}

/// Reads a `.gml` or `.gexf` file.
///
/// # Errors
/// Returns [`GraphFileError::UnsupportedExtension`] for other extensions,
/// [`GraphFileError::Io`] when the file cannot be read, and the parse error
/// wrapped in [`GraphFileError::InFile`] otherwise.
pub fn read_graph(path: &Path) -> Result<Graph, GraphFileError> {
    let format = GraphFormat::from_path(path).ok_or_else(|| GraphFileError::UnsupportedExtension {
        path: path.to_path_buf(),
    })?;
    let text = fs::read_to_string(path).map_err(|source| GraphFileError::io(path, source))?;
    format.parse(&text).map_err(|err| err.in_file(path))
}

/// Records read by [`load_corpus`].
#[derive(Clone, Debug, Default)]
pub struct LoadedCorpus {
    /// Graphs with their statistics, ordered by file name.
    pub records: Vec<GraphRecord>,
    /// Files that were skipped with a warning.
    pub skipped: usize,
}

/// Loads every graph under `dir/graphs` together with its statistics from
/// `dir/stats/<stem>.txt`.
///
/// Files are visited in file-name order. Files with another extension, a
/// missing statistics file, or content that fails to parse are skipped with
/// a warning and counted in [`LoadedCorpus::skipped`].
///
/// # Errors
/// Returns [`GraphFileError::Io`] when `dir/graphs` cannot be listed.
#[instrument(name = "providers.load_corpus", err, skip_all, fields(dir = %dir.display()))]
pub fn load_corpus(dir: &Path) -> Result<LoadedCorpus, GraphFileError> {
    let graphs_dir = dir.join(GRAPHS_DIR);
    let stats_dir = dir.join(STATS_DIR);
    let mut paths = list_files(&graphs_dir)?;
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut corpus = LoadedCorpus::default();
    for path in paths {
        match load_record(&path, &stats_dir) {
            Ok(record) => corpus.records.push(record),
            Err(reason) => {
                warn!(path = %path.display(), %reason, "skipping graph file");
                corpus.skipped += 1;
            }
        }
    }
    info!(
        records = corpus.records.len(),
        skipped = corpus.skipped,
        "loaded graph corpus"
    );
    Ok(corpus)
}

fn list_files(dir: &Path) -> Result<Vec<PathBuf>, GraphFileError> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(|source| GraphFileError::io(dir, source))? {
        let path = entry.map_err(|source| GraphFileError::io(dir, source))?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    Ok(paths)
}

fn load_record(path: &Path, stats_dir: &Path) -> Result<GraphRecord, GraphFileError> {
    let graph = read_graph(path)?;
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stats = read_stats(&stats_dir.join(format!("{stem}.txt")))?;
    Ok(GraphRecord {
        name: Arc::from(stem),
        graph,
        stats,
    })
}
