//! JSON cache of an encoded corpus.
//!
//! Canonicalisation and spectral features dominate start-up on large
//! corpora, so the encoded samples are stored next to the data together
//! with the [`EncodingParams`] that produced them.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::Path,
};

use neugraph_core::{EncodingParams, Sample, encode_corpus};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::{corpus::load_corpus, errors::GraphFileError};

/// Format version written into every cache file.
pub const CACHE_VERSION: u32 = 1;

#[derive(Serialize)]
struct CacheRef<'a> {
    version: u32,
    params: EncodingParams,
    samples: &'a [Sample],
}

#[derive(Deserialize)]
struct CacheFile {
    version: u32,
    params: EncodingParams,
    samples: Vec<Sample>,
}

/// Reads cached samples encoded with `params`.
///
/// Returns `Ok(None)` when the file does not exist or was written with
/// different parameters or another format version.
///
/// # Errors
/// Returns [`GraphFileError::Io`] or [`GraphFileError::Cache`] when an
/// existing file cannot be read or decoded.
pub fn load_cache(
    path: &Path,
    params: EncodingParams,
) -> Result<Option<Vec<Sample>>, GraphFileError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(GraphFileError::io(path, source)),
    };
    let cache: CacheFile =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| GraphFileError::Cache {
            path: path.to_path_buf(),
            source,
        })?;
    if cache.version != CACHE_VERSION || cache.params != params {
        info!(path = %path.display(), "dataset cache was built with other parameters");
        return Ok(None);
    }
    Ok(Some(cache.samples))
}

/// Writes `samples` and `params` to `path`, creating parent directories.
///
/// # Errors
/// Returns [`GraphFileError::Io`] or [`GraphFileError::Cache`] when the file
/// cannot be written.
pub fn store_cache(
    path: &Path,
    params: EncodingParams,
    samples: &[Sample],
) -> Result<(), GraphFileError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| GraphFileError::io(parent, source))?;
    }
    let file = File::create(path).map_err(|source| GraphFileError::io(path, source))?;
    let mut writer = BufWriter::new(file);
    let cache = CacheRef {
        version: CACHE_VERSION,
        params,
        samples,
    };
    serde_json::to_writer(&mut writer, &cache).map_err(|source| GraphFileError::Cache {
        path: path.to_path_buf(),
        source,
    })?;
    writer
        .flush()
        .map_err(|source| GraphFileError::io(path, source))
}

/// Returns the encoded corpus under `dir`, reusing `cache` when it matches
/// `params` and rebuilding it otherwise.
///
/// An unreadable cache is reported and rebuilt rather than treated as fatal.
///
/// # Errors
/// Returns the [`load_corpus`] error, or the [`store_cache`] error when the
/// rebuilt cache cannot be written.
#[instrument(
    name = "providers.cached_corpus",
    err,
    skip_all,
    fields(dir = %dir.display(), cache = %cache.display()),
)]
pub fn cached_corpus(
    dir: &Path,
    cache: &Path,
    params: EncodingParams,
) -> Result<Vec<Sample>, GraphFileError> {
    match load_cache(cache, params) {
        Ok(Some(samples)) => {
            info!(samples = samples.len(), "reusing dataset cache");
            return Ok(samples);
        }
        Ok(None) => {}
        Err(error) => warn!(%error, "ignoring unreadable dataset cache"),
    }
    let corpus = load_corpus(dir)?;
    let encoded = encode_corpus(&corpus.records, params);
    store_cache(cache, params, &encoded.samples)?;
    Ok(encoded.samples)
}
