//! File-backed graph providers: GML and GEXF readers, statistics files,
//! corpus directories and the encoded dataset cache.

mod assembler;
mod cache;
mod corpus;
mod errors;
mod gexf;
mod gml;
mod stats;

pub use cache::{CACHE_VERSION, cached_corpus, load_cache, store_cache};
pub use corpus::{GRAPHS_DIR, GraphFormat, LoadedCorpus, STATS_DIR, load_corpus, read_graph};
pub use errors::GraphFileError;
pub use gexf::parse_gexf;
pub use gml::parse_gml;
pub use stats::{parse_stats, read_stats};

#[cfg(test)]
mod tests;
