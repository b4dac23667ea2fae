use ndarray::{s, Array1, Array4, Axis};

use super::output_extent;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParam {
    /// Pixels between adjacent receptive fields, both directions
    pub stride: usize,
    /// Zeros added symmetrically on each side of height and width
    pub pad: usize,
}

impl Default for ConvParam {
    fn default() -> Self {
        ConvParam { stride: 1, pad: 0 }
    }
}

/// Values kept from [`conv_forward_naive`] for the backward pass
#[derive(Debug, Clone)]
pub struct ConvCache {
    x_padded: Array4<f64>,
    weights: Array4<f64>,
    param: ConvParam,
    input_hw: (usize, usize),
    output_hw: (usize, usize),
}

fn zero_pad(x: &Array4<f64>, pad: usize) -> Array4<f64> {
    let (n, c, h, w) = x.dim();
    let mut padded = Array4::zeros((n, c, h + 2 * pad, w + 2 * pad));
    padded.slice_mut(s![.., .., pad..pad + h, pad..pad + w]).assign(x);
    padded
}

/// Naive forward pass for a convolutional layer.
///
/// # Arguments
///
/// * `x` - Input of shape `(N, C, H, W)`
/// * `weights` - Filters of shape `(F, C, HH, WW)`
/// * `bias` - Bias of shape `(F,)`
///
/// # Returns
///
/// Output of shape `(N, F, H', W')` where
/// `H' = 1 + (H + 2 * pad - HH) / stride` and
/// `W' = 1 + (W + 2 * pad - WW) / stride`
pub fn conv_forward_naive(
    x: &Array4<f64>,
    weights: &Array4<f64>,
    bias: &Array1<f64>,
    param: &ConvParam,
) -> Result<(Array4<f64>, ConvCache)> {
    let (n, channels, height, width) = x.dim();
    let (filters, weight_channels, kernel_h, kernel_w) = weights.dim();
    if weight_channels != channels {
        return Err(Error::ShapeMismatch {
            expected: vec![filters, channels, kernel_h, kernel_w],
            actual: weights.shape().to_vec(),
        });
    }
    if bias.len() != filters {
        return Err(Error::ShapeMismatch {
            expected: vec![filters],
            actual: vec![bias.len()],
        });
    }

    let ConvParam { stride, pad } = *param;
    let output_height = output_extent(height, kernel_h, pad, stride)?;
    let output_width = output_extent(width, kernel_w, pad, stride)?;

    let x_padded = zero_pad(x, pad);
    let mut output = Array4::<f64>::zeros((n, filters, output_height, output_width));

    for example in 0..n {
        for f in 0..filters {
            let filter = weights.index_axis(Axis(0), f);
            for h in 0..output_height {
                for w in 0..output_width {
                    let h_start = h * stride;
                    let w_start = w * stride;
                    let field = x_padded.slice(s![
                        example,
                        ..,
                        h_start..h_start + kernel_h,
                        w_start..w_start + kernel_w
                    ]);

                    output[[example, f, h, w]] = (&field * &filter).sum() + bias[f];
                }
            }
        }
    }

    let cache = ConvCache {
        x_padded,
        weights: weights.clone(),
        param: *param,
        input_hw: (height, width),
        output_hw: (output_height, output_width),
    };
    Ok((output, cache))
}

/// Naive backward pass for a convolutional layer.
///
/// Returns `(dx, dw, db)`.
pub fn conv_backward_naive(
    dout: &Array4<f64>,
    cache: ConvCache,
) -> Result<(Array4<f64>, Array4<f64>, Array1<f64>)> {
    let ConvCache {
        x_padded,
        weights,
        param,
        input_hw: (height, width),
        output_hw: (output_height, output_width),
    } = cache;
    let n = x_padded.len_of(Axis(0));
    let (filters, _, kernel_h, kernel_w) = weights.dim();
    let expected = (n, filters, output_height, output_width);
    if dout.dim() != expected {
        return Err(Error::ShapeMismatch {
            expected: vec![expected.0, expected.1, expected.2, expected.3],
            actual: dout.shape().to_vec(),
        });
    }
    let ConvParam { stride, pad } = param;

    let db = dout.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0));
    let mut dw = Array4::<f64>::zeros(weights.raw_dim());
    let mut dx_padded = Array4::<f64>::zeros(x_padded.raw_dim());

    for example in 0..n {
        for f in 0..filters {
            let filter = weights.index_axis(Axis(0), f);
            for h in 0..output_height {
                for w in 0..output_width {
                    let grad = dout[[example, f, h, w]];
                    let rows = h * stride..h * stride + kernel_h;
                    let cols = w * stride..w * stride + kernel_w;

                    let field = x_padded.slice(s![example, .., rows.clone(), cols.clone()]);
                    dw.index_axis_mut(Axis(0), f).scaled_add(grad, &field);
                    dx_padded
                        .slice_mut(s![example, .., rows, cols])
                        .scaled_add(grad, &filter);
                }
            }
        }
    }

    let dx = dx_padded
        .slice(s![.., .., pad..pad + height, pad..pad + width])
        .to_owned();
    Ok((dx, dw, db))
}
