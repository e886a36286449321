use std::{collections::BTreeMap, path::Path, sync::Arc};

use candle_nn::VarMap;
use neugraph_core::{
    CheckpointPaths, EncodingParams, GeneratorBuilder, Graph, GraphRecord, STATS_DIM, Sample,
    StatsVector, encode_corpus,
};

pub const N_MAX: usize = 6;
pub const SPECTRAL_DIM: usize = 2;

fn stats_for(graph: &Graph) -> StatsVector {
    let mut values = [0.0_f32; STATS_DIM];
    values[0] = graph.node_count() as f32;
    values[1] = graph.edge_count() as f32;
    values[2] = graph.summary().density as f32;
    StatsVector::new(values)
}

fn record(name: &str, graph: Graph) -> GraphRecord {
    GraphRecord {
        name: Arc::from(name),
        stats: stats_for(&graph),
        graph,
    }
}

/// Rings, paths and stars on three to six nodes.
#[must_use]
pub fn corpus() -> Vec<Sample> {
    let mut records = Vec::new();
    for n in 3..=N_MAX {
        let ring = Graph::from_edges(n, (0..n).map(|i| (i, (i + 1) % n))).expect("ring");
        let path = Graph::from_edges(n, (1..n).map(|i| (i - 1, i))).expect("path");
        let star = Graph::from_edges(n, (1..n).map(|leaf| (0, leaf))).expect("star");
        records.push(record(&format!("ring{n}"), ring));
        records.push(record(&format!("path{n}"), path));
        records.push(record(&format!("star{n}"), star));
    }
    let params = EncodingParams::new(N_MAX, SPECTRAL_DIM).expect("params");
    encode_corpus(&records, params).samples
}

/// A small, fast configuration writing checkpoints into `dir`.
#[must_use]
pub fn small_builder(dir: &Path) -> GeneratorBuilder {
    GeneratorBuilder::new()
        .with_n_max(N_MAX)
        .with_spectral_dim(SPECTRAL_DIM)
        .with_hidden_dim_encoder(8)
        .with_hidden_dim_decoder(16)
        .with_latent_dim(4)
        .with_hidden_dim_denoise(8)
        .with_dim_condition(8)
        .with_timesteps(10)
        .with_epochs_autoencoder(3)
        .with_epochs_denoise(3)
        .with_batch_size(4)
        .with_checkpoints(CheckpointPaths::in_dir(dir))
}

/// Every variable of `var_map`, flattened and keyed by name.
#[must_use]
pub fn snapshot(var_map: &VarMap) -> BTreeMap<String, Vec<f32>> {
    let vars = var_map.data().lock().expect("var map lock");
    vars.iter()
        .map(|(name, var)| {
            let values = var
                .as_tensor()
                .flatten_all()
                .and_then(|t| t.to_vec1::<f32>())
                .expect("f32 parameter");
            (name.clone(), values)
        })
        .collect()
}
