use ndarray::{Array, Dimension};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::Mode;
use crate::error::{Error, Result};

/// Configuration of an inverted dropout layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DropoutParam {
    /// Probability of keeping each activation
    pub p: f64,
    pub mode: Mode,
    /// Makes the mask deterministic; needed for gradient checking
    pub seed: Option<u64>,
}

impl DropoutParam {
    pub fn new(p: f64) -> Self {
        DropoutParam {
            p,
            mode: Mode::Train,
            seed: None,
        }
    }
}

/// Mask kept from [`dropout_forward`]; `None` in test mode
#[derive(Debug, Clone)]
pub struct DropoutCache<D: Dimension> {
    pub mode: Mode,
    pub mask: Option<Array<f64, D>>,
    /// Shape of the forward input
    pub dim: D,
}

/// Forward pass for inverted dropout.
///
/// In train mode every activation is kept with probability `p` and kept
/// activations are scaled by `1 / p`, so no rescaling is needed at test time.
/// In test mode the input passes through unchanged.
pub fn dropout_forward<D: Dimension>(
    x: &Array<f64, D>,
    param: &DropoutParam,
) -> Result<(Array<f64, D>, DropoutCache<D>)> {
    let p = param.p;
    if !(p > 0.0 && p <= 1.0) {
        return Err(Error::KeepProbability(p));
    }

    match param.mode {
        Mode::Train => {
            let mut rng = match param.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            let scale = 1.0 / p;
            let mask = Array::from_shape_fn(x.raw_dim(), |_| {
                if rng.random::<f64>() < p { scale } else { 0.0 }
            });

            let output = x * &mask;
            Ok((
                output,
                DropoutCache {
                    mode: Mode::Train,
                    mask: Some(mask),
                    dim: x.raw_dim(),
                },
            ))
        }
        Mode::Test => Ok((
            x.clone(),
            DropoutCache {
                mode: Mode::Test,
                mask: None,
                dim: x.raw_dim(),
            },
        )),
    }
}

/// Backward pass for inverted dropout
pub fn dropout_backward<D: Dimension>(dout: &Array<f64, D>, cache: DropoutCache<D>) -> Result<Array<f64, D>> {
    if dout.raw_dim() != cache.dim {
        return Err(Error::ShapeMismatch {
            expected: cache.dim.slice().to_vec(),
            actual: dout.shape().to_vec(),
        });
    }
    // During backprop, we multiply gradients by the same mask
    Ok(match cache.mask {
        Some(mask) => dout * &mask,
        None => dout.clone(),
    })
}
