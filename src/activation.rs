use ndarray::{Array, Dimension, Zip};

use crate::error::{Error, Result};

/// Pre-activation kept from [`relu_forward`]
#[derive(Debug, Clone)]
pub struct ReluCache<D: Dimension> {
    pub x: Array<f64, D>,
}

/// Rectified linear units over an input of any shape
pub fn relu_forward<D: Dimension>(x: &Array<f64, D>) -> (Array<f64, D>, ReluCache<D>) {
    let out = x.mapv(|v| v.max(0.0));
    (out, ReluCache { x: x.clone() })
}

/// Passes the upstream gradient only where the cached input was strictly positive
pub fn relu_backward<D: Dimension>(dout: &Array<f64, D>, cache: ReluCache<D>) -> Result<Array<f64, D>> {
    if dout.shape() != cache.x.shape() {
        return Err(Error::ShapeMismatch {
            expected: cache.x.shape().to_vec(),
            actual: dout.shape().to_vec(),
        });
    }
    Ok(Zip::from(dout)
        .and(&cache.x)
        .map_collect(|&g, &x| if x > 0.0 { g } else { 0.0 }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_relu_forward() {
        let x = array![[-1.0, 0.0, 2.0], [3.5, -0.25, 0.5]];
        let (out, _) = relu_forward(&x);

        assert_eq!(out, array![[0.0, 0.0, 2.0], [3.5, 0.0, 0.5]]);
    }

    #[test]
    fn test_relu_backward_blocks_non_positive() {
        let x = array![[-1.0, 0.0, 2.0], [3.5, -0.25, 0.5]];
        let (_, cache) = relu_forward(&x);

        let dout = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let dx = relu_backward(&dout, cache).unwrap();

        // ties at exactly zero are blocked
        assert_eq!(dx, array![[0.0, 0.0, 3.0], [4.0, 0.0, 6.0]]);
    }

    #[test]
    fn test_relu_backward_rejects_transposed_dout() {
        let (_, cache) = relu_forward(&Array2::<f64>::ones((2, 3)));

        let err = relu_backward(&Array2::ones((3, 2)), cache).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
