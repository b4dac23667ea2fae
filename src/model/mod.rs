mod fully_connected;
mod two_layer;

use ndarray::{Array, Array1, Array2, Dimension};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::error::Result;

pub use fully_connected::FullyConnectedNet;
pub use two_layer::TwoLayerNet;

/// Learned scale and shift of a normalized layer
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleShift {
    pub gamma: Array1<f64>,
    pub beta: Array1<f64>,
}

/// Parameters of one affine layer, or their gradients
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    /// Shape `(input_dim, output_dim)`
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
    /// Present on hidden layers followed by batch or layer norm
    pub scale_shift: Option<ScaleShift>,
}

impl LayerParams {
    /// Draws weights from `N(0, weight_scale^2)`; bias and beta start at zero, gamma at one.
    pub(crate) fn init(
        input_dim: usize,
        output_dim: usize,
        weight_scale: f64,
        normalized: bool,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let normal = Normal::new(0.0, weight_scale)?;
        let weights = Array2::from_shape_fn((input_dim, output_dim), |_| normal.sample(rng));
        let scale_shift = normalized.then(|| ScaleShift {
            gamma: Array1::ones(output_dim),
            beta: Array1::zeros(output_dim),
        });
        Ok(LayerParams {
            weights,
            bias: Array1::zeros(output_dim),
            scale_shift,
        })
    }

    pub fn parameter_count(&self) -> usize {
        let scale_shift = self
            .scale_shift
            .as_ref()
            .map_or(0, |ss| ss.gamma.len() + ss.beta.len());
        self.weights.len() + self.bias.len() + scale_shift
    }
}

/// Result of [`Classifier::compute`]
#[derive(Debug, Clone)]
pub enum Evaluation {
    /// Class scores of shape `(N, C)`, produced when no labels are given
    Scores(Array2<f64>),
    /// Loss and one gradient record per layer, aligned with [`Classifier::params`]
    Trained { loss: f64, grads: Vec<LayerParams> },
}

/// A network that maps a batch of inputs to class scores
pub trait Classifier {
    /// Inference pass. Dropout is disabled and batch norm uses its running
    /// statistics, which are left untouched.
    fn scores<D: Dimension>(&self, x: &Array<f64, D>) -> Result<Array2<f64>>;

    /// Training pass returning the regularized loss and the gradient of every
    /// parameter.
    fn loss<D: Dimension>(&mut self, x: &Array<f64, D>, labels: &[usize]) -> Result<(f64, Vec<LayerParams>)>;

    fn params(&self) -> &[LayerParams];

    fn params_mut(&mut self) -> &mut [LayerParams];

    /// Scores when `labels` is `None`, otherwise loss and gradients
    fn compute<D: Dimension>(&mut self, x: &Array<f64, D>, labels: Option<&[usize]>) -> Result<Evaluation> {
        match labels {
            None => Ok(Evaluation::Scores(self.scores(x)?)),
            Some(labels) => {
                let (loss, grads) = self.loss(x, labels)?;
                Ok(Evaluation::Trained { loss, grads })
            }
        }
    }

    fn parameter_count(&self) -> usize {
        self.params().iter().map(LayerParams::parameter_count).sum()
    }
}

pub(crate) fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    }
}

/// Adds `0.5 * reg * sum(W^2)` to the loss and `reg * W` to every weight gradient.
///
/// Returns the regularization loss.
pub(crate) fn regularize(params: &[LayerParams], grads: &mut [LayerParams], reg: f64) -> f64 {
    let mut reg_loss = 0.0;
    for (p, g) in params.iter().zip(grads.iter_mut()) {
        reg_loss += 0.5 * reg * p.weights.mapv(|w| w * w).sum();
        g.weights.scaled_add(reg, &p.weights);
    }
    reg_loss
}
