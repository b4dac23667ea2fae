use ndarray::{Array, Array2, Dimension};

use super::{regularize, seeded_rng, Classifier, LayerParams};
use crate::error::Result;
use crate::hyperparameters::TwoLayerConfig;
use crate::layers::affine::flatten_rows;
use crate::layers::{affine_backward, affine_forward, affine_relu_backward, affine_relu_forward};
use crate::loss::Loss;

/// Two-layer fully-connected network with a ReLU hidden layer:
/// affine - relu - affine - loss.
///
/// Inputs have dimension `D`, the hidden layer has `H` units and the output
/// scores `C` classes.
#[derive(Debug, Clone)]
pub struct TwoLayerNet {
    params: Vec<LayerParams>,
    reg: f64,
    loss: Loss,
}

impl TwoLayerNet {
    pub fn new(config: &TwoLayerConfig) -> Result<Self> {
        let mut rng = seeded_rng(config.seed);
        let params = vec![
            LayerParams::init(config.input_dim, config.hidden_dim, config.weight_scale, false, &mut rng)?,
            LayerParams::init(config.hidden_dim, config.num_classes, config.weight_scale, false, &mut rng)?,
        ];
        log::debug!(
            "two layer net: {} -> {} -> {}, weight_scale={}, reg={}",
            config.input_dim,
            config.hidden_dim,
            config.num_classes,
            config.weight_scale,
            config.reg
        );
        Ok(TwoLayerNet {
            params,
            reg: config.reg,
            loss: config.loss,
        })
    }
}

impl Classifier for TwoLayerNet {
    fn scores<D: Dimension>(&self, x: &Array<f64, D>) -> Result<Array2<f64>> {
        let x = flatten_rows(x)?;
        let (hidden, output) = (&self.params[0], &self.params[1]);
        let (h, _) = affine_relu_forward(&x, &hidden.weights, &hidden.bias)?;
        let (scores, _) = affine_forward(&h, &output.weights, &output.bias)?;
        Ok(scores)
    }

    fn loss<D: Dimension>(&mut self, x: &Array<f64, D>, labels: &[usize]) -> Result<(f64, Vec<LayerParams>)> {
        let x = flatten_rows(x)?;
        let (hidden, output) = (&self.params[0], &self.params[1]);

        let (h, hidden_cache) = affine_relu_forward(&x, &hidden.weights, &hidden.bias)?;
        let (scores, output_cache) = affine_forward(&h, &output.weights, &output.bias)?;
        log::trace!("hidden {:?}, scores {:?}", h.dim(), scores.dim());

        let (data_loss, dscores) = self.loss.compute(&scores, labels)?;

        let (dh, dw2, db2) = affine_backward(&dscores, output_cache)?;
        let (_, dw1, db1) = affine_relu_backward(&dh, hidden_cache)?;

        let mut grads = vec![
            LayerParams { weights: dw1, bias: db1, scale_shift: None },
            LayerParams { weights: dw2, bias: db2, scale_shift: None },
        ];
        let reg_loss = regularize(&self.params, &mut grads, self.reg);
        log::debug!("data loss {data_loss:.6}, reg loss {reg_loss:.6}");

        Ok((data_loss + reg_loss, grads))
    }

    fn params(&self) -> &[LayerParams] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [LayerParams] {
        &mut self.params
    }
}
