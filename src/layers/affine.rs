use ndarray::{Array, Array1, Array2, Axis, Dimension};

use crate::error::{Error, Result};

/// Values kept from [`affine_forward`] for the backward pass
#[derive(Debug, Clone)]
pub struct AffineCache<D: Dimension> {
    pub x: Array<f64, D>,
    pub weights: Array2<f64>,
}

/// Flattens an `(N, d_1, ..., d_k)` batch into `(N, d_1 * ... * d_k)` rows.
pub(crate) fn flatten_rows<D: Dimension>(x: &Array<f64, D>) -> Result<Array2<f64>> {
    let shape = x.shape();
    let Some((&n, rest)) = shape.split_first() else {
        return Err(Error::ShapeMismatch {
            expected: vec![0, 0],
            actual: Vec::new(),
        });
    };
    let d = rest.iter().product::<usize>();
    Ok(x.to_shape((n, d))?.into_owned())
}

/// Computes `x.reshape(N, D) . w + b`.
///
/// # Arguments
///
/// * `x` - Minibatch of shape `(N, d_1, ..., d_k)`
/// * `weights` - Weights of shape `(D, M)` where `D = d_1 * ... * d_k`
/// * `bias` - Bias of shape `(M,)`
///
/// # Returns
///
/// Output of shape `(N, M)` and the cache for [`affine_backward`]
pub fn affine_forward<D: Dimension>(
    x: &Array<f64, D>,
    weights: &Array2<f64>,
    bias: &Array1<f64>,
) -> Result<(Array2<f64>, AffineCache<D>)> {
    let rows = flatten_rows(x)?;
    if rows.ncols() != weights.nrows() {
        return Err(Error::ShapeMismatch {
            expected: vec![rows.nrows(), weights.nrows()],
            actual: vec![rows.nrows(), rows.ncols()],
        });
    }
    if bias.len() != weights.ncols() {
        return Err(Error::ShapeMismatch {
            expected: vec![weights.ncols()],
            actual: vec![bias.len()],
        });
    }

    let output = rows.dot(weights) + bias;
    let cache = AffineCache {
        x: x.clone(),
        weights: weights.clone(),
    };
    Ok((output, cache))
}

/// Backward pass for an affine layer.
///
/// Returns `(dx, dw, db)` with `dx` in the original input shape.
pub fn affine_backward<D: Dimension>(
    dout: &Array2<f64>,
    cache: AffineCache<D>,
) -> Result<(Array<f64, D>, Array2<f64>, Array1<f64>)> {
    let AffineCache { x, weights } = cache;
    let rows = flatten_rows(&x)?;
    if dout.dim() != (rows.nrows(), weights.ncols()) {
        return Err(Error::ShapeMismatch {
            expected: vec![rows.nrows(), weights.ncols()],
            actual: dout.shape().to_vec(),
        });
    }

    let dw = rows.t().dot(dout);
    let db = dout.sum_axis(Axis(0));
    let dx = dout.dot(&weights.t()).into_shape_with_order(x.raw_dim())?;
    Ok((dx, dw, db))
}
