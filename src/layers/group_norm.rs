use ndarray::{Array1, Array2, Array4, ArrayView4, Axis};

use super::normalization::{standardize, standardize_backward_simplified, NormGradients, Standardized};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupNormParam {
    pub eps: f64,
}

impl Default for GroupNormParam {
    fn default() -> Self {
        GroupNormParam { eps: 1e-5 }
    }
}

/// Values kept from [`spatial_groupnorm_forward`]
#[derive(Debug, Clone)]
pub struct GroupNormCache {
    gamma: Array1<f64>,
    dim: (usize, usize, usize, usize),
    groups: usize,
    /// One column per `(example, group)` pair
    stats: Standardized,
}

/// `(N, C, H, W)` -> `(C / G * H * W, N * G)`
fn group_columns(x: &Array4<f64>, groups: usize) -> Result<Array2<f64>> {
    let (n, c, h, w) = x.dim();
    let rows = x.to_shape((n * groups, c / groups * h * w))?;
    Ok(rows.t().to_owned())
}

/// Inverse of [`group_columns`]
fn ungroup_columns(cols: &Array2<f64>, (n, c, h, w): (usize, usize, usize, usize)) -> Result<Array4<f64>> {
    Ok(cols.t().to_shape((n, c, h, w))?.into_owned())
}

fn per_channel(v: &Array1<f64>) -> Result<ArrayView4<'_, f64>> {
    Ok(v.view().into_shape_with_order((1, v.len(), 1, 1))?)
}

/// Sums `(N, C, H, W)` over everything but the channel axis
fn channel_sums(x: &Array4<f64>) -> Array1<f64> {
    x.sum_axis(Axis(3)).sum_axis(Axis(2)).sum_axis(Axis(0))
}

/// Forward pass for spatial group normalization.
///
/// The `C` channels of each example are split into `groups` contiguous
/// groups; every group is normalized over its channels and spatial positions,
/// then the per-channel `gamma` and `beta` are applied.
///
/// # Arguments
///
/// * `x` - Data of shape `(N, C, H, W)`
/// * `gamma` - Scale of shape `(C,)`
/// * `beta` - Shift of shape `(C,)`
/// * `groups` - Number of groups, must divide `C`
pub fn spatial_groupnorm_forward(
    x: &Array4<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    groups: usize,
    param: &GroupNormParam,
) -> Result<(Array4<f64>, GroupNormCache)> {
    let dim = x.dim();
    let channels = dim.1;
    if groups == 0 || channels % groups != 0 {
        return Err(Error::GroupCount { channels, groups });
    }
    for len in [gamma.len(), beta.len()] {
        if len != channels {
            return Err(Error::ShapeMismatch {
                expected: vec![channels],
                actual: vec![len],
            });
        }
    }
    if x.is_empty() {
        return Err(Error::EmptyBatch);
    }

    let stats = standardize(group_columns(x, groups)?.view(), param.eps);
    let x_hat = ungroup_columns(&stats.x_hat, dim)?;
    let out = &x_hat * &per_channel(gamma)? + &per_channel(beta)?;

    let cache = GroupNormCache {
        gamma: gamma.clone(),
        dim,
        groups,
        stats,
    };
    Ok((out, cache))
}

/// Backward pass for spatial group normalization
pub fn spatial_groupnorm_backward(
    dout: &Array4<f64>,
    cache: GroupNormCache,
) -> Result<NormGradients<Array4<f64>>> {
    let GroupNormCache { gamma, dim, groups, stats } = cache;
    if dout.dim() != dim {
        return Err(Error::ShapeMismatch {
            expected: vec![dim.0, dim.1, dim.2, dim.3],
            actual: dout.shape().to_vec(),
        });
    }
    let x_hat = ungroup_columns(&stats.x_hat, dim)?;

    let dbeta = channel_sums(dout);
    let dgamma = channel_sums(&(dout * &x_hat));

    let dx_hat = dout * &per_channel(&gamma)?;
    let dx = standardize_backward_simplified(&group_columns(&dx_hat, groups)?, &stats);
    let dx = ungroup_columns(&dx, dim)?;
    Ok(NormGradients { dx, dgamma, dbeta })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Array4<f64> {
        Array4::from_shape_fn((2, 4, 2, 3), |(n, c, h, w)| {
            ((n * 7 + c * 5 + h * 3 + w) % 11) as f64 - 4.0 + c as f64 * 0.5
        })
    }

    #[test]
    fn test_each_group_is_normalized() {
        let x = sample();
        let gamma = Array1::ones(4);
        let beta = Array1::zeros(4);

        let (out, _) = spatial_groupnorm_forward(&x, &gamma, &beta, 2, &GroupNormParam::default()).unwrap();

        assert_eq!(out.dim(), x.dim());
        for n in 0..2 {
            for g in 0..2 {
                let group = out.slice(ndarray::s![n, g * 2..g * 2 + 2, .., ..]);
                let mean = group.sum() / group.len() as f64;
                let var = group.mapv(|v| (v - mean) * (v - mean)).sum() / group.len() as f64;
                assert!(mean.abs() < 1e-9);
                assert!((var - 1.0).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn test_one_group_per_channel_matches_per_channel_stats() {
        let x = sample();
        let gamma = Array1::ones(4);
        let beta = Array1::zeros(4);

        let (out, _) = spatial_groupnorm_forward(&x, &gamma, &beta, 4, &GroupNormParam::default()).unwrap();

        let plane = out.slice(ndarray::s![1, 3, .., ..]);
        assert!((plane.sum() / plane.len() as f64).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_indivisible_groups() {
        let x = sample();
        let err = spatial_groupnorm_forward(&x, &Array1::ones(4), &Array1::zeros(4), 3, &GroupNormParam::default())
            .unwrap_err();
        assert!(matches!(err, Error::GroupCount { channels: 4, groups: 3 }));

        let err = spatial_groupnorm_forward(&x, &Array1::ones(4), &Array1::zeros(4), 0, &GroupNormParam::default())
            .unwrap_err();
        assert!(matches!(err, Error::GroupCount { groups: 0, .. }));
    }

    #[test]
    fn test_shift_gradient_is_channel_sum() {
        let x = sample();
        let gamma = Array1::from_vec(vec![1.0, 2.0, 0.5, -1.0]);
        let beta = Array1::zeros(4);
        let (_, cache) = spatial_groupnorm_forward(&x, &gamma, &beta, 2, &GroupNormParam::default()).unwrap();

        let dout = Array4::ones(x.dim());
        let grads = spatial_groupnorm_backward(&dout, cache).unwrap();

        assert_eq!(grads.dbeta, Array1::from_elem(4, 12.0));
        assert_eq!(grads.dx.dim(), x.dim());
    }
}
