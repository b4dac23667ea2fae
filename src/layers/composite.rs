//! Convenience layers that chain an affine transform, an optional
//! normalization and a ReLU.

use ndarray::{Array1, Array2, Ix2};

use super::affine::{affine_backward, affine_forward, AffineCache};
use super::normalization::{NormCache, NormLayer};
use super::Mode;
use crate::activation::{relu_backward, relu_forward, ReluCache};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AffineReluCache {
    affine: AffineCache<Ix2>,
    relu: ReluCache<Ix2>,
}

/// affine -> relu
pub fn affine_relu_forward(
    x: &Array2<f64>,
    weights: &Array2<f64>,
    bias: &Array1<f64>,
) -> Result<(Array2<f64>, AffineReluCache)> {
    let (a, affine) = affine_forward(x, weights, bias)?;
    let (out, relu) = relu_forward(&a);
    Ok((out, AffineReluCache { affine, relu }))
}

/// Backward pass for [`affine_relu_forward`], returns `(dx, dw, db)`
pub fn affine_relu_backward(
    dout: &Array2<f64>,
    cache: AffineReluCache,
) -> Result<(Array2<f64>, Array2<f64>, Array1<f64>)> {
    let da = relu_backward(dout, cache.relu)?;
    affine_backward(&da, cache.affine)
}

#[derive(Debug, Clone)]
pub struct AffineNormReluCache {
    affine: AffineCache<Ix2>,
    norm: NormCache,
    relu: ReluCache<Ix2>,
}

/// affine -> batch/layer norm -> relu.
///
/// Returns the normalization state to use for the next call alongside the
/// output and cache.
pub fn affine_norm_relu_forward(
    x: &Array2<f64>,
    weights: &Array2<f64>,
    bias: &Array1<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    norm: &NormLayer,
    mode: Mode,
) -> Result<(Array2<f64>, AffineNormReluCache, NormLayer)> {
    let (a, affine) = affine_forward(x, weights, bias)?;
    let (a_norm, norm_cache, next) = norm.forward(&a, gamma, beta, mode)?;
    let (out, relu) = relu_forward(&a_norm);
    let cache = AffineNormReluCache {
        affine,
        norm: norm_cache,
        relu,
    };
    Ok((out, cache, next))
}

/// Backward pass for [`affine_norm_relu_forward`], returns `(dx, dw, db, dgamma, dbeta)`
#[allow(clippy::type_complexity)]
pub fn affine_norm_relu_backward(
    dout: &Array2<f64>,
    cache: AffineNormReluCache,
) -> Result<(Array2<f64>, Array2<f64>, Array1<f64>, Array1<f64>, Array1<f64>)> {
    let da = relu_backward(dout, cache.relu)?;
    let norm = cache.norm.backward(&da)?;
    let (dx, dw, db) = affine_backward(&norm.dx, cache.affine)?;
    Ok((dx, dw, db, norm.dgamma, norm.dbeta))
}
