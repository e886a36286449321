//! GIN encoder with sum pooling.

use candle_core::Tensor;
use candle_nn::{BatchNorm, Linear, Module, VarBuilder, batch_norm, linear, ops::leaky_relu};
use rand::RngCore;

use super::{Phase, normalize};
use crate::{error::Result, noise::dropout, sample::GraphBatch};

const NEGATIVE_SLOPE: f64 = 0.2;
const NORM_EPS: f64 = 1e-5;

/// `h_i = MLP(x_i + Σ_{j ∈ N(i)} x_j)`.
struct GinLayer {
    first: Linear,
    norm: BatchNorm,
    second: Linear,
}

impl GinLayer {
    fn new(input_dim: usize, hidden_dim: usize, vb: &VarBuilder) -> Result<Self> {
        Ok(Self {
            first: linear(input_dim, hidden_dim, vb.pp("first"))?,
            norm: batch_norm(hidden_dim, NORM_EPS, vb.pp("norm"))?,
            second: linear(hidden_dim, hidden_dim, vb.pp("second"))?,
        })
    }

    fn forward(&self, xs: &Tensor, batch: &GraphBatch, phase: Phase) -> Result<Tensor> {
        let combined = if batch.edge_src().dim(0)? == 0 {
            xs.clone()
        } else {
            let messages = xs.index_select(batch.edge_src(), 0)?;
            let aggregated = xs.zeros_like()?.index_add(batch.edge_dst(), &messages, 0)?;
            (xs + aggregated)?
        };
        let hidden = leaky_relu(&self.first.forward(&combined)?, NEGATIVE_SLOPE)?;
        let hidden = normalize(&self.norm, &hidden, phase)?;
        Ok(leaky_relu(&self.second.forward(&hidden)?, NEGATIVE_SLOPE)?)
    }
}

/// Message-passing encoder producing one vector per graph.
pub(super) struct GinEncoder {
    layers: Vec<GinLayer>,
    pool_norm: BatchNorm,
    head: Linear,
    hidden_dim: usize,
    dropout: f32,
}

impl GinEncoder {
    pub(super) fn new(
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        n_layers: usize,
        dropout: f32,
        vb: &VarBuilder,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(n_layers);
        for index in 0..n_layers {
            let width = if index == 0 { input_dim } else { hidden_dim };
            layers.push(GinLayer::new(
                width,
                hidden_dim,
                &vb.pp(format!("conv{index}")),
            )?);
        }
        Ok(Self {
            layers,
            pool_norm: batch_norm(hidden_dim, NORM_EPS, vb.pp("pool_norm"))?,
            head: linear(hidden_dim, output_dim, vb.pp("head"))?,
            hidden_dim,
            dropout,
        })
    }

    pub(super) fn forward(
        &self,
        batch: &GraphBatch,
        phase: Phase,
        rng: &mut dyn RngCore,
    ) -> Result<Tensor> {
        let mut xs = batch.features().clone();
        for layer in &self.layers {
            xs = layer.forward(&xs, batch, phase)?;
            if phase.is_train() {
                xs = dropout(rng, &xs, self.dropout)?;
            }
        }
        let pooled = Tensor::zeros(
            (batch.graph_count(), self.hidden_dim),
            xs.dtype(),
            xs.device(),
        )?
        .index_add(batch.node_graph(), &xs, 0)?;
        let pooled = normalize(&self.pool_norm, &pooled, phase)?;
        Ok(self.head.forward(&pooled)?)
    }
}
