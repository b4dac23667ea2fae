use ndarray::{Array1, Array2, Axis};

use super::normalization::{standardize, standardize_backward, NormGradients, Standardized};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerNormParam {
    pub eps: f64,
}

impl Default for LayerNormParam {
    fn default() -> Self {
        LayerNormParam { eps: 1e-5 }
    }
}

/// Values kept from [`layernorm_forward`].
///
/// The statistics are stored transposed, `(D, N)`, one column per example.
#[derive(Debug, Clone)]
pub struct LayerNormCache {
    gamma: Array1<f64>,
    stats: Standardized,
}

impl LayerNormCache {
    /// Normalized input in its original `(N, D)` orientation
    pub fn x_hat(&self) -> Array2<f64> {
        self.stats.x_hat.t().to_owned()
    }
}

/// Forward pass for layer normalization.
///
/// Each example is normalized across its features, then scaled and shifted
/// per feature. Behaves the same in training and inference and keeps no
/// running statistics.
///
/// # Arguments
///
/// * `x` - Data of shape `(N, D)`
/// * `gamma` - Scale of shape `(D,)`
/// * `beta` - Shift of shape `(D,)`
pub fn layernorm_forward(
    x: &Array2<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    param: &LayerNormParam,
) -> Result<(Array2<f64>, LayerNormCache)> {
    let features = x.ncols();
    for len in [gamma.len(), beta.len()] {
        if len != features {
            return Err(Error::ShapeMismatch {
                expected: vec![features],
                actual: vec![len],
            });
        }
    }
    if features == 0 {
        return Err(Error::EmptyBatch);
    }

    let stats = standardize(x.t(), param.eps);
    let out = &stats.x_hat.t() * gamma + beta;
    let cache = LayerNormCache {
        gamma: gamma.clone(),
        stats,
    };
    Ok((out, cache))
}

/// Backward pass for layer normalization
pub fn layernorm_backward(dout: &Array2<f64>, cache: LayerNormCache) -> Result<NormGradients<Array2<f64>>> {
    let LayerNormCache { gamma, stats } = cache;
    let x_hat = stats.x_hat.t();
    if dout.dim() != x_hat.dim() {
        return Err(Error::ShapeMismatch {
            expected: x_hat.shape().to_vec(),
            actual: dout.shape().to_vec(),
        });
    }

    let dbeta = dout.sum_axis(Axis(0));
    let dgamma = (dout * &x_hat).sum_axis(Axis(0));

    let dx_hat = (dout * &gamma).reversed_axes();
    let dx = standardize_backward(&dx_hat, &stats).reversed_axes();
    Ok(NormGradients { dx, dgamma, dbeta })
}
