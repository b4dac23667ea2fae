use ndarray::{Array1, Array2, Array4, Axis};

use super::normalization::{
    standardize, standardize_backward, standardize_backward_simplified, NormGradients, Standardized,
};
use super::Mode;
use crate::error::{Error, Result};

/// Configuration of a batch normalization layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchNormParam {
    pub mode: Mode,
    /// Added to the variance before the square root
    pub eps: f64,
    /// Decay of the running statistics; 0 keeps only the latest batch
    pub momentum: f64,
}

impl Default for BatchNormParam {
    fn default() -> Self {
        BatchNormParam {
            mode: Mode::Train,
            eps: 1e-5,
            momentum: 0.9,
        }
    }
}

/// Exponentially decayed per-feature mean and variance used at test time
#[derive(Debug, Clone, PartialEq)]
pub struct RunningStats {
    pub mean: Array1<f64>,
    pub var: Array1<f64>,
}

impl RunningStats {
    pub fn new(features: usize) -> Self {
        RunningStats {
            mean: Array1::zeros(features),
            var: Array1::zeros(features),
        }
    }

    fn decay(&self, mean: &Array1<f64>, var: &Array1<f64>, momentum: f64) -> RunningStats {
        RunningStats {
            mean: &self.mean * momentum + mean * (1.0 - momentum),
            var: &self.var * momentum + var * (1.0 - momentum),
        }
    }
}

#[derive(Debug, Clone)]
enum BatchNormState {
    Train(Standardized),
    /// Normalized with frozen statistics; only `x_hat` and `std` matter
    Test { x_hat: Array2<f64>, std: Array1<f64> },
}

/// Values kept from [`batchnorm_forward`] for the backward pass
#[derive(Debug, Clone)]
pub struct BatchNormCache {
    gamma: Array1<f64>,
    state: BatchNormState,
}

impl BatchNormCache {
    pub fn mode(&self) -> Mode {
        match self.state {
            BatchNormState::Train(_) => Mode::Train,
            BatchNormState::Test { .. } => Mode::Test,
        }
    }

    pub fn x_hat(&self) -> &Array2<f64> {
        match &self.state {
            BatchNormState::Train(s) => &s.x_hat,
            BatchNormState::Test { x_hat, .. } => x_hat,
        }
    }
}

fn check_features(features: usize, gamma: &Array1<f64>, beta: &Array1<f64>, running: &RunningStats) -> Result<()> {
    for len in [gamma.len(), beta.len(), running.mean.len(), running.var.len()] {
        if len != features {
            return Err(Error::ShapeMismatch {
                expected: vec![features],
                actual: vec![len],
            });
        }
    }
    Ok(())
}

/// Forward pass for batch normalization.
///
/// In train mode the batch mean and (uncorrected) variance normalize the
/// input and are folded into the running statistics:
///
/// ```text
/// running_mean = momentum * running_mean + (1 - momentum) * sample_mean
/// running_var  = momentum * running_var  + (1 - momentum) * sample_var
/// ```
///
/// In test mode the running statistics normalize the input and are returned
/// untouched.
///
/// # Arguments
///
/// * `x` - Data of shape `(N, D)`
/// * `gamma` - Scale of shape `(D,)`
/// * `beta` - Shift of shape `(D,)`
/// * `param` - Mode, eps and momentum
/// * `running` - Running statistics from the previous call
///
/// # Returns
///
/// Output of shape `(N, D)`, the cache, and the running statistics to pass
/// to the next call
pub fn batchnorm_forward(
    x: &Array2<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    param: &BatchNormParam,
    running: &RunningStats,
) -> Result<(Array2<f64>, BatchNormCache, RunningStats)> {
    check_features(x.ncols(), gamma, beta, running)?;

    match param.mode {
        Mode::Train => {
            if x.nrows() == 0 {
                return Err(Error::EmptyBatch);
            }
            let s = standardize(x.view(), param.eps);
            let sample_mean = x.sum_axis(Axis(0)) / x.nrows() as f64;
            let sample_var = &s.var - param.eps;
            let next = running.decay(&sample_mean, &sample_var, param.momentum);

            let out = &s.x_hat * gamma + beta;
            let cache = BatchNormCache {
                gamma: gamma.clone(),
                state: BatchNormState::Train(s),
            };
            Ok((out, cache, next))
        }
        Mode::Test => {
            let std = running.var.mapv(|v| (v + param.eps).sqrt());
            let x_hat = (x - &running.mean) / &std;
            let out = &x_hat * gamma + beta;
            let cache = BatchNormCache {
                gamma: gamma.clone(),
                state: BatchNormState::Test { x_hat, std },
            };
            Ok((out, cache, running.clone()))
        }
    }
}

fn batchnorm_backward_with(
    dout: &Array2<f64>,
    cache: BatchNormCache,
    through_stats: fn(&Array2<f64>, &Standardized) -> Array2<f64>,
) -> Result<NormGradients<Array2<f64>>> {
    let BatchNormCache { gamma, state } = cache;
    let x_hat = match &state {
        BatchNormState::Train(s) => &s.x_hat,
        BatchNormState::Test { x_hat, .. } => x_hat,
    };
    if dout.dim() != x_hat.dim() {
        return Err(Error::ShapeMismatch {
            expected: x_hat.shape().to_vec(),
            actual: dout.shape().to_vec(),
        });
    }

    let dbeta = dout.sum_axis(Axis(0));
    let dgamma = (dout * x_hat).sum_axis(Axis(0));
    let dx_hat = dout * &gamma;

    let dx = match &state {
        BatchNormState::Train(s) => through_stats(&dx_hat, s),
        BatchNormState::Test { std, .. } => dx_hat / std,
    };
    Ok(NormGradients { dx, dgamma, dbeta })
}

/// Backward pass for batch normalization, propagated node by node through
/// the mean, variance and standard deviation of the computation graph.
pub fn batchnorm_backward(dout: &Array2<f64>, cache: BatchNormCache) -> Result<NormGradients<Array2<f64>>> {
    batchnorm_backward_with(dout, cache, standardize_backward)
}

/// Backward pass for batch normalization using the simplified closed form.
///
/// Accepts the same cache as [`batchnorm_backward`] and produces the same
/// gradients up to rounding.
pub fn batchnorm_backward_alt(dout: &Array2<f64>, cache: BatchNormCache) -> Result<NormGradients<Array2<f64>>> {
    batchnorm_backward_with(dout, cache, standardize_backward_simplified)
}

/// Values kept from [`spatial_batchnorm_forward`]
#[derive(Debug, Clone)]
pub struct SpatialBatchNormCache {
    dim: (usize, usize, usize, usize),
    inner: BatchNormCache,
}

/// `(N, C, H, W)` -> `(N * H * W, C)`
fn channels_last(x: &Array4<f64>) -> Result<Array2<f64>> {
    let (n, c, h, w) = x.dim();
    let permuted = x.view().permuted_axes([0, 2, 3, 1]);
    Ok(permuted.to_shape((n * h * w, c))?.into_owned())
}

/// `(N * H * W, C)` -> `(N, C, H, W)`
fn channels_first(x: Array2<f64>, (n, c, h, w): (usize, usize, usize, usize)) -> Result<Array4<f64>> {
    let nhwc = x.into_shape_with_order((n, h, w, c))?;
    Ok(nhwc.permuted_axes([0, 3, 1, 2]).as_standard_layout().into_owned())
}

/// Batch normalization of `(N, C, H, W)` data with one mean and variance per
/// channel, computed over the batch and both spatial axes.
pub fn spatial_batchnorm_forward(
    x: &Array4<f64>,
    gamma: &Array1<f64>,
    beta: &Array1<f64>,
    param: &BatchNormParam,
    running: &RunningStats,
) -> Result<(Array4<f64>, SpatialBatchNormCache, RunningStats)> {
    let dim = x.dim();
    let flat = channels_last(x)?;
    let (out, inner, running) = batchnorm_forward(&flat, gamma, beta, param, running)?;
    let out = channels_first(out, dim)?;
    Ok((out, SpatialBatchNormCache { dim, inner }, running))
}

/// Backward pass for [`spatial_batchnorm_forward`]
pub fn spatial_batchnorm_backward(
    dout: &Array4<f64>,
    cache: SpatialBatchNormCache,
) -> Result<NormGradients<Array4<f64>>> {
    let SpatialBatchNormCache { dim, inner } = cache;
    if dout.dim() != dim {
        return Err(Error::ShapeMismatch {
            expected: vec![dim.0, dim.1, dim.2, dim.3],
            actual: dout.shape().to_vec(),
        });
    }
    let flat = channels_last(dout)?;
    let grads = batchnorm_backward(&flat, inner)?;
    Ok(NormGradients {
        dx: channels_first(grads.dx, dim)?,
        dgamma: grads.dgamma,
        dbeta: grads.dbeta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> Array2<f64> {
        array![[1.0, -2.0, 0.5], [3.0, 0.0, 1.5], [5.0, 2.0, -0.5], [7.0, 4.0, 2.5]]
    }

    #[test]
    fn test_train_mode_normalizes_features() {
        let x = sample();
        let gamma = Array1::ones(3);
        let beta = Array1::zeros(3);
        let (out, cache, _) =
            batchnorm_forward(&x, &gamma, &beta, &BatchNormParam::default(), &RunningStats::new(3)).unwrap();

        assert_eq!(cache.mode(), Mode::Train);
        let mean = out.sum_axis(Axis(0)) / 4.0;
        let var = out.mapv(|v| v * v).sum_axis(Axis(0)) / 4.0;
        assert!(mean.iter().all(|m| m.abs() < 1e-9));
        assert!(var.iter().all(|v| (v - 1.0).abs() < 1e-3));
    }

    #[test]
    fn test_scale_and_shift_are_applied() {
        let x = sample();
        let gamma = array![2.0, 0.5, 1.0];
        let beta = array![-1.0, 3.0, 0.0];
        let (out, cache, _) =
            batchnorm_forward(&x, &gamma, &beta, &BatchNormParam::default(), &RunningStats::new(3)).unwrap();

        let expected = cache.x_hat() * &gamma + &beta;
        assert_eq!(out, expected);
        let mean = out.sum_axis(Axis(0)) / 4.0;
        assert!((mean[0] + 1.0).abs() < 1e-9);
        assert!((mean[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_running_stats_decay() {
        let x = sample();
        let gamma = Array1::ones(3);
        let beta = Array1::zeros(3);
        let param = BatchNormParam::default();
        let (_, _, running) = batchnorm_forward(&x, &gamma, &beta, &param, &RunningStats::new(3)).unwrap();

        // batch mean of the first feature is 4, variance is 5
        assert!((running.mean[0] - 0.4).abs() < 1e-12);
        assert!((running.var[0] - 0.5).abs() < 1e-12);

        let (_, _, running) = batchnorm_forward(&x, &gamma, &beta, &param, &running).unwrap();
        assert!((running.mean[0] - (0.9 * 0.4 + 0.4)).abs() < 1e-12);
        assert!((running.var[0] - (0.9 * 0.5 + 0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_test_mode_uses_running_stats() {
        let x = sample();
        let gamma = Array1::ones(3);
        let beta = Array1::zeros(3);
        let running = RunningStats {
            mean: array![4.0, 1.0, 1.0],
            var: array![5.0, 5.0, 1.25],
        };
        let param = BatchNormParam {
            mode: Mode::Test,
            ..BatchNormParam::default()
        };

        let (out, cache, after) = batchnorm_forward(&x, &gamma, &beta, &param, &running).unwrap();

        assert_eq!(cache.mode(), Mode::Test);
        assert_eq!(after, running);
        let expected = (1.0 - 4.0) / (5.0f64 + 1e-5).sqrt();
        assert!((out[[0, 0]] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_test_mode_backward_scales_by_frozen_std() {
        let x = sample();
        let gamma = array![2.0, 1.0, 1.0];
        let beta = Array1::zeros(3);
        let running = RunningStats {
            mean: Array1::zeros(3),
            var: array![3.0, 1.0, 1.0],
        };
        let param = BatchNormParam {
            mode: Mode::Test,
            eps: 1.0,
            ..BatchNormParam::default()
        };
        let (_, cache, _) = batchnorm_forward(&x, &gamma, &beta, &param, &running).unwrap();

        let grads = batchnorm_backward(&Array2::ones((4, 3)), cache).unwrap();
        // gamma / sqrt(var + eps) = 2 / 2
        assert!(grads.dx.column(0).iter().all(|&v| (v - 1.0).abs() < 1e-12));
        assert!(grads.dx.column(1).iter().all(|&v| (v - 1.0 / 2f64.sqrt()).abs() < 1e-12));
        assert_eq!(grads.dbeta, array![4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_backward_and_alt_agree() {
        let x = sample();
        let gamma = array![1.5, -0.5, 0.75];
        let beta = array![0.1, 0.2, 0.3];
        let (_, cache, _) =
            batchnorm_forward(&x, &gamma, &beta, &BatchNormParam::default(), &RunningStats::new(3)).unwrap();
        let dout = array![[0.5, -1.0, 2.0], [1.5, 0.25, -0.5], [-2.0, 1.0, 0.0], [0.3, 0.7, -1.2]];

        let graph = batchnorm_backward(&dout, cache.clone()).unwrap();
        let alt = batchnorm_backward_alt(&dout, cache).unwrap();

        for (a, b) in graph.dx.iter().zip(alt.dx.iter()) {
            assert!((a - b).abs() < 1e-10);
        }
        assert_eq!(graph.dgamma, alt.dgamma);
        assert_eq!(graph.dbeta, alt.dbeta);
    }

    #[test]
    fn test_rejects_mismatched_gamma() {
        let x = sample();
        let err = batchnorm_forward(
            &x,
            &Array1::ones(2),
            &Array1::zeros(3),
            &BatchNormParam::default(),
            &RunningStats::new(3),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_spatial_batchnorm_normalizes_channels() {
        let x = Array4::from_shape_fn((2, 3, 2, 2), |(n, c, h, w)| {
            (c as f64 + 1.0) * 10.0 + (n * 4 + h * 2 + w) as f64 * (c as f64 + 1.0)
        });
        let gamma = Array1::ones(3);
        let beta = Array1::zeros(3);

        let (out, _, running) =
            spatial_batchnorm_forward(&x, &gamma, &beta, &BatchNormParam::default(), &RunningStats::new(3))
                .unwrap();

        assert_eq!(out.dim(), (2, 3, 2, 2));
        for c in 0..3 {
            let channel = out.index_axis(Axis(1), c);
            let mean = channel.sum() / channel.len() as f64;
            assert!(mean.abs() < 1e-9);
        }
        assert!(running.mean.iter().all(|&m| m > 0.0));
    }
}
