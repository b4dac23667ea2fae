use ndarray::{Array, Dimension};

use crate::error::{Error, Result};
use crate::model::LayerParams;

/// Vanilla stochastic gradient descent: `p <- p - learning_rate * dp`
#[derive(Debug, Clone)]
pub struct Optimizer {
    pub learning_rate: f64,
}

impl Optimizer {
    pub fn new(learning_rate: f64) -> Self {
        Self { learning_rate }
    }

    /// Applies one update to every weight, bias, gamma and beta.
    ///
    /// `grads` must line up with `params` layer by layer, as returned by
    /// [`Classifier::loss`](crate::Classifier::loss).
    pub fn step(&self, params: &mut [LayerParams], grads: &[LayerParams]) -> Result<()> {
        if params.len() != grads.len() {
            return Err(Error::ShapeMismatch {
                expected: vec![params.len()],
                actual: vec![grads.len()],
            });
        }

        for (p, g) in params.iter_mut().zip(grads) {
            self.update(&mut p.weights, &g.weights)?;
            self.update(&mut p.bias, &g.bias)?;
            match (&mut p.scale_shift, &g.scale_shift) {
                (Some(p), Some(g)) => {
                    self.update(&mut p.gamma, &g.gamma)?;
                    self.update(&mut p.beta, &g.beta)?;
                }
                (None, None) => {}
                (Some(_), None) | (None, Some(_)) => {
                    return Err(Error::ShapeMismatch {
                        expected: p.bias.shape().to_vec(),
                        actual: Vec::new(),
                    });
                }
            }
        }
        log::trace!("sgd step over {} layers, lr={}", params.len(), self.learning_rate);
        Ok(())
    }

    fn update<D: Dimension>(&self, param: &mut Array<f64, D>, grad: &Array<f64, D>) -> Result<()> {
        if param.shape() != grad.shape() {
            return Err(Error::ShapeMismatch {
                expected: param.shape().to_vec(),
                actual: grad.shape().to_vec(),
            });
        }
        param.scaled_add(-self.learning_rate, grad);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ScaleShift;
    use ndarray::array;

    fn layer(value: f64, normalized: bool) -> LayerParams {
        LayerParams {
            weights: array![[value, value]],
            bias: array![value, value],
            scale_shift: normalized.then(|| ScaleShift {
                gamma: array![value, value],
                beta: array![value, value],
            }),
        }
    }

    #[test]
    fn test_step_updates_every_parameter() {
        let mut params = vec![layer(1.0, true), layer(2.0, false)];
        let grads = vec![layer(10.0, true), layer(-10.0, false)];

        Optimizer::new(0.1).step(&mut params, &grads).unwrap();

        assert_eq!(params[0].weights, array![[0.0, 0.0]]);
        assert_eq!(params[0].bias, array![0.0, 0.0]);
        let ss = params[0].scale_shift.as_ref().unwrap();
        assert_eq!(ss.gamma, array![0.0, 0.0]);
        assert_eq!(ss.beta, array![0.0, 0.0]);
        assert_eq!(params[1].weights, array![[3.0, 3.0]]);
    }

    #[test]
    fn test_step_rejects_misaligned_grads() {
        let mut params = vec![layer(1.0, true)];
        let optimizer = Optimizer::new(0.1);

        assert!(optimizer.step(&mut params, &[]).is_err());
        assert!(optimizer.step(&mut params, &[layer(1.0, false)]).is_err());
    }
}
