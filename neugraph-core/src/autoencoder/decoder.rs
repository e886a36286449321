//! MLP decoder emitting symmetric edge probabilities.

use candle_core::{D, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder, linear, ops::softmax};
use rand::RngCore;

use crate::{error::Result, noise::gumbel};

/// How per-pair edge logits become adjacency entries while training.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum EdgeReadout {
    /// Softmax probability of the edge channel.
    #[default]
    Probabilities,
    /// Hard Gumbel-softmax sample with straight-through gradients.
    GumbelHard {
        /// Softmax temperature.
        tau: f64,
    },
}

/// Maps latents to `(graphs, n_max, n_max)` symmetric matrices.
///
/// The final layer emits two logits for every strict upper-triangle pair,
/// channel 0 meaning "edge". A constant placement matrix scatters each pair
/// into both triangle positions, leaving the diagonal zero.
pub(super) struct EdgeDecoder {
    layers: Vec<Linear>,
    placement: Tensor,
    n_max: usize,
    pairs: usize,
}

impl EdgeDecoder {
    pub(super) fn new(
        latent_dim: usize,
        hidden_dim: usize,
        n_layers: usize,
        n_max: usize,
        vb: &VarBuilder,
        device: &Device,
    ) -> Result<Self> {
        let pairs = n_max * n_max.saturating_sub(1) / 2;
        let mut layers = Vec::with_capacity(n_layers);
        for index in 0..n_layers {
            let input = if index == 0 { latent_dim } else { hidden_dim };
            let output = if index + 1 == n_layers {
                2 * pairs
            } else {
                hidden_dim
            };
            layers.push(linear(input, output, vb.pp(format!("mlp{index}")))?);
        }
        Ok(Self {
            layers,
            placement: placement_matrix(n_max, device)?,
            n_max,
            pairs,
        })
    }

    fn logits(&self, latent: &Tensor) -> Result<Tensor> {
        let mut xs = latent.clone();
        let last = self.layers.len().saturating_sub(1);
        for (index, layer) in self.layers.iter().enumerate() {
            xs = layer.forward(&xs)?;
            if index < last {
                xs = xs.relu()?;
            }
        }
        Ok(xs.reshape((latent.dim(0)?, self.pairs, 2))?)
    }

    /// Softmax edge probabilities, deterministic.
    pub(super) fn probabilities(&self, latent: &Tensor) -> Result<Tensor> {
        let logits = self.logits(latent)?;
        self.assemble(&edge_channel(&softmax(&logits, D::Minus1)?)?)
    }

    /// Hard Gumbel-softmax adjacency with soft gradients.
    fn sample_hard(&self, latent: &Tensor, tau: f64, rng: &mut dyn RngCore) -> Result<Tensor> {
        let logits = self.logits(latent)?;
        let noise = gumbel(rng, logits.shape(), logits.device())?;
        let soft = softmax(&((logits + noise)? / tau)?, D::Minus1)?;
        let soft_edge = edge_channel(&soft)?;
        let soft_gap = soft.narrow(2, 1, 1)?.squeeze(2)?;
        let hard = soft_edge.ge(&soft_gap)?.to_dtype(soft_edge.dtype())?;
        self.assemble(&((hard - soft_edge.detach())? + soft_edge)?)
    }

    /// Decodes `latent` with the given read-out.
    pub(super) fn decode(
        &self,
        latent: &Tensor,
        readout: EdgeReadout,
        rng: &mut dyn RngCore,
    ) -> Result<Tensor> {
        match readout {
            EdgeReadout::Probabilities => self.probabilities(latent),
            EdgeReadout::GumbelHard { tau } => self.sample_hard(latent, tau, rng),
        }
    }

    fn assemble(&self, edges: &Tensor) -> Result<Tensor> {
        let graphs = edges.dim(0)?;
        Ok(edges
            .matmul(&self.placement)?
            .reshape((graphs, self.n_max, self.n_max))?)
    }
}

fn edge_channel(probabilities: &Tensor) -> Result<Tensor> {
    Ok(probabilities.narrow(2, 0, 1)?.squeeze(2)?)
}

/// `(pairs, n_max²)` matrix with ones at `(k, i·n+j)` and `(k, j·n+i)` for
/// the `k`-th upper-triangle pair `(i, j)` in row-major order.
fn placement_matrix(n_max: usize, device: &Device) -> Result<Tensor> {
    let cells = n_max * n_max;
    let mut values = Vec::new();
    for i in 0..n_max {
        for j in (i + 1)..n_max {
            let mut row = vec![0.0_f32; cells];
            for idx in [i * n_max + j, j * n_max + i] {
                if let Some(cell) = row.get_mut(idx) {
                    *cell = 1.0;
                }
            }
            values.extend(row);
        }
    }
    let pairs = values.len() / cells.max(1);
    Ok(Tensor::from_vec(values, (pairs, cells), device)?)
}
