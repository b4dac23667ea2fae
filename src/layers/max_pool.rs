use ndarray::{s, Array4, Zip};

use super::output_extent;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolParam {
    pub pool_height: usize,
    pub pool_width: usize,
    /// Distance between adjacent pooling regions
    pub stride: usize,
}

impl Default for PoolParam {
    fn default() -> Self {
        PoolParam {
            pool_height: 2,
            pool_width: 2,
            stride: 2,
        }
    }
}

/// Input kept from [`max_pool_forward_naive`]
#[derive(Debug, Clone)]
pub struct PoolCache {
    input: Array4<f64>,
    param: PoolParam,
    output_hw: (usize, usize),
}

/// Naive forward pass for a max-pooling layer. No padding is applied.
///
/// Output has shape `(N, C, H', W')` where
/// `H' = 1 + (H - pool_height) / stride` and
/// `W' = 1 + (W - pool_width) / stride`.
pub fn max_pool_forward_naive(x: &Array4<f64>, param: &PoolParam) -> Result<(Array4<f64>, PoolCache)> {
    let (n, channels, height, width) = x.dim();
    let output_height = output_extent(height, param.pool_height, 0, param.stride)?;
    let output_width = output_extent(width, param.pool_width, 0, param.stride)?;

    let mut output = Array4::<f64>::zeros((n, channels, output_height, output_width));

    for example in 0..n {
        for c in 0..channels {
            for h in 0..output_height {
                for w in 0..output_width {
                    let h_start = h * param.stride;
                    let w_start = w * param.stride;

                    // Find maximum in pooling window
                    let window = x.slice(s![
                        example,
                        c,
                        h_start..h_start + param.pool_height,
                        w_start..w_start + param.pool_width
                    ]);
                    output[[example, c, h, w]] = window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                }
            }
        }
    }

    let cache = PoolCache {
        input: x.clone(),
        param: *param,
        output_hw: (output_height, output_width),
    };
    Ok((output, cache))
}

/// Naive backward pass for a max-pooling layer.
///
/// Each upstream gradient goes to every position of its window that holds
/// the window maximum, so tied maxima each receive the full gradient.
pub fn max_pool_backward_naive(dout: &Array4<f64>, cache: PoolCache) -> Result<Array4<f64>> {
    let PoolCache { input, param, output_hw } = cache;
    let (n, channels, _, _) = input.dim();
    let expected = (n, channels, output_hw.0, output_hw.1);
    if dout.dim() != expected {
        return Err(Error::ShapeMismatch {
            expected: vec![expected.0, expected.1, expected.2, expected.3],
            actual: dout.shape().to_vec(),
        });
    }

    let mut input_gradient = Array4::<f64>::zeros(input.raw_dim());

    for example in 0..n {
        for c in 0..channels {
            for h in 0..output_hw.0 {
                for w in 0..output_hw.1 {
                    let rows = h * param.stride..h * param.stride + param.pool_height;
                    let cols = w * param.stride..w * param.stride + param.pool_width;

                    let window = input.slice(s![example, c, rows.clone(), cols.clone()]);
                    let max = window.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
                    let grad = dout[[example, c, h, w]];

                    Zip::from(input_gradient.slice_mut(s![example, c, rows, cols]))
                        .and(&window)
                        .for_each(|dx, &v| {
                            if v == max {
                                *dx += grad;
                            }
                        });
                }
            }
        }
    }

    Ok(input_gradient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_two_by_two_window() {
        let x = array![[[[1.0, 2.0], [3.0, 4.0]]]];
        let (out, cache) = max_pool_forward_naive(&x, &PoolParam::default()).unwrap();

        assert_eq!(out, array![[[[4.0]]]]);

        let dx = max_pool_backward_naive(&array![[[[1.0]]]], cache).unwrap();
        assert_eq!(dx, array![[[[0.0, 0.0], [0.0, 1.0]]]]);
    }

    #[test]
    fn test_overlapping_windows() {
        let x = Array4::from_shape_fn((1, 1, 3, 3), |(_, _, h, w)| (h * 3 + w) as f64);
        let param = PoolParam {
            pool_height: 2,
            pool_width: 2,
            stride: 1,
        };

        let (out, cache) = max_pool_forward_naive(&x, &param).unwrap();
        assert_eq!(out, array![[[[4.0, 5.0], [7.0, 8.0]]]]);

        let dx = max_pool_backward_naive(&Array4::ones((1, 1, 2, 2)), cache).unwrap();
        assert_eq!(dx[[0, 0, 2, 2]], 1.0);
        assert_eq!(dx[[0, 0, 1, 1]], 1.0);
        assert_eq!(dx[[0, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_ties_duplicate_gradient() {
        let x = array![[[[5.0, 5.0], [1.0, 5.0]]]];
        let (_, cache) = max_pool_forward_naive(&x, &PoolParam::default()).unwrap();

        let dx = max_pool_backward_naive(&array![[[[2.0]]]], cache).unwrap();
        assert_eq!(dx, array![[[[2.0, 2.0], [0.0, 2.0]]]]);
    }

    #[test]
    fn test_rejects_partial_window() {
        let x = Array4::<f64>::zeros((1, 1, 5, 5));
        let err = max_pool_forward_naive(&x, &PoolParam::default()).unwrap_err();
        assert!(matches!(err, Error::Geometry { extent: 5, .. }));
    }
}
