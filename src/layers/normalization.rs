//! Standardization shared by batch, layer and group normalization.
//!
//! Every variant reduces to the same computation on a matrix whose rows are
//! the samples being averaged over:
//!
//! ```text
//! mu    = sum(x) / N
//! var   = sum((x - mu)^2) / N + eps
//! std   = sqrt(var)
//! x_hat = (x - mu) / std
//! ```
//!
//! Batch norm feeds `(N, D)` directly, layer norm feeds the transpose, and
//! group norm feeds one column per `(example, group)` pair.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use super::batch_norm::{batchnorm_backward, batchnorm_forward, BatchNormCache, BatchNormParam, RunningStats};
use super::layer_norm::{layernorm_backward, layernorm_forward, LayerNormCache, LayerNormParam};
use super::Mode;
use crate::error::Result;

/// Intermediates of a column-wise standardization
#[derive(Debug, Clone)]
pub struct Standardized {
    pub x_hat: Array2<f64>,
    pub xmu: Array2<f64>,
    /// Variance with eps already added
    pub var: Array1<f64>,
    pub std: Array1<f64>,
}

/// Standardizes every column of `x` over its rows
pub(crate) fn standardize(x: ArrayView2<'_, f64>, eps: f64) -> Standardized {
    let n = x.nrows() as f64;
    let mean = x.sum_axis(Axis(0)) / n;
    let xmu = &x - &mean;
    let var = xmu.mapv(|v| v * v).sum_axis(Axis(0)) / n + eps;
    let std = var.mapv(f64::sqrt);
    let x_hat = &xmu / &std;
    Standardized { x_hat, xmu, var, std }
}

/// Gradient through [`standardize`] following the computation graph node by node
pub(crate) fn standardize_backward(dx_hat: &Array2<f64>, s: &Standardized) -> Array2<f64> {
    let n = dx_hat.nrows() as f64;

    // x_hat = xmu * (1 / std)
    let dxmu_direct = dx_hat / &s.std;
    let dinv_std = (dx_hat * &s.xmu).sum_axis(Axis(0));

    // 1 / std -> std -> var
    let dstd = -(dinv_std / &s.var);
    let dvar = &dstd * 0.5 / &s.std;

    // var = mean(xmu^2)
    let dxmu_sq = dvar / n;
    let dxmu_var = &s.xmu * &dxmu_sq * 2.0;

    // xmu = x - mu
    let dxmu = dxmu_direct + dxmu_var;
    let dmu = -dxmu.sum_axis(Axis(0));
    &dxmu + &(dmu / n)
}

/// Closed form of [`standardize_backward`]:
/// `dx = (N * dx_hat - sum(dx_hat) - x_hat * sum(dx_hat * x_hat)) / (N * std)`
pub(crate) fn standardize_backward_simplified(dx_hat: &Array2<f64>, s: &Standardized) -> Array2<f64> {
    let n = dx_hat.nrows() as f64;
    let sum_dx_hat = dx_hat.sum_axis(Axis(0));
    let sum_dx_hat_x_hat = (dx_hat * &s.x_hat).sum_axis(Axis(0));

    let numerator = &(dx_hat * n) - &sum_dx_hat - &s.x_hat * &sum_dx_hat_x_hat;
    numerator / &(&s.std * n)
}

/// Gradients of a normalization layer
#[derive(Debug, Clone)]
pub struct NormGradients<T> {
    pub dx: T,
    pub dgamma: Array1<f64>,
    pub dbeta: Array1<f64>,
}

/// Per-layer normalization state owned by a network.
///
/// Batch norm carries its running statistics; [`NormLayer::forward`] returns
/// the successor state instead of mutating in place.
#[derive(Debug, Clone)]
pub enum NormLayer {
    Batch {
        param: BatchNormParam,
        running: RunningStats,
    },
    Layer(LayerNormParam),
}

impl NormLayer {
    pub fn forward(
        &self,
        x: &Array2<f64>,
        gamma: &Array1<f64>,
        beta: &Array1<f64>,
        mode: Mode,
    ) -> Result<(Array2<f64>, NormCache, NormLayer)> {
        match self {
            NormLayer::Batch { param, running } => {
                let param = BatchNormParam { mode, ..*param };
                let (out, cache, running) = batchnorm_forward(x, gamma, beta, &param, running)?;
                Ok((out, NormCache::Batch(cache), NormLayer::Batch { param, running }))
            }
            NormLayer::Layer(param) => {
                let (out, cache) = layernorm_forward(x, gamma, beta, param)?;
                Ok((out, NormCache::Layer(cache), NormLayer::Layer(*param)))
            }
        }
    }
}

/// Cache of whichever normalization produced it
#[derive(Debug, Clone)]
pub enum NormCache {
    Batch(BatchNormCache),
    Layer(LayerNormCache),
}

impl NormCache {
    pub fn backward(self, dout: &Array2<f64>) -> Result<NormGradients<Array2<f64>>> {
        match self {
            NormCache::Batch(cache) => batchnorm_backward(dout, cache),
            NormCache::Layer(cache) => layernorm_backward(dout, cache),
        }
    }
}
