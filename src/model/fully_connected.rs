use ndarray::{Array, Array2, Dimension, Ix2};

use super::{regularize, seeded_rng, Classifier, LayerParams, ScaleShift};
use crate::error::{Error, Result};
use crate::hyperparameters::{FullyConnectedConfig, Normalization};
use crate::layers::affine::flatten_rows;
use crate::layers::{
    affine_backward, affine_forward, affine_norm_relu_backward, affine_norm_relu_forward, affine_relu_backward,
    affine_relu_forward, dropout_backward, dropout_forward, AffineCache, AffineNormReluCache, AffineReluCache,
    DropoutCache, DropoutParam, Mode, NormLayer, RunningStats,
};
use crate::loss::Loss;

/// Fully-connected network with an arbitrary number of hidden layers:
///
/// ```text
/// {affine - [batch/layer norm] - relu - [dropout]} x (L - 1) - affine - loss
/// ```
///
/// Normalization and dropout apply to every hidden layer and never to the
/// output layer.
#[derive(Debug, Clone)]
pub struct FullyConnectedNet {
    params: Vec<LayerParams>,
    /// One per hidden layer when normalization is enabled, otherwise empty
    norm_layers: Vec<NormLayer>,
    dropout: Option<DropoutParam>,
    reg: f64,
    loss: Loss,
}

#[derive(Debug)]
enum HiddenBlock {
    Plain(AffineReluCache),
    Normalized(AffineNormReluCache),
}

#[derive(Debug)]
struct HiddenCache {
    block: HiddenBlock,
    dropout: Option<DropoutCache<Ix2>>,
}

struct ForwardPass {
    scores: Array2<f64>,
    hidden: Vec<HiddenCache>,
    output: AffineCache<Ix2>,
    norm_layers: Vec<NormLayer>,
}

impl FullyConnectedNet {
    pub fn new(config: &FullyConnectedConfig) -> Result<Self> {
        let keep = config.dropout_keep;
        if !(keep > 0.0 && keep <= 1.0) {
            return Err(Error::KeepProbability(keep));
        }

        let mut rng = seeded_rng(config.seed);
        let normalized = config.normalization != Normalization::None;

        let mut dims = Vec::with_capacity(config.hidden_dims.len() + 2);
        dims.push(config.input_dim);
        dims.extend_from_slice(&config.hidden_dims);
        dims.push(config.num_classes);

        let mut params = Vec::with_capacity(dims.len() - 1);
        for (i, pair) in dims.windows(2).enumerate() {
            let hidden = i < config.hidden_dims.len();
            params.push(LayerParams::init(
                pair[0],
                pair[1],
                config.weight_scale,
                hidden && normalized,
                &mut rng,
            )?);
        }

        let norm_layers = config
            .hidden_dims
            .iter()
            .filter_map(|&dim| match config.normalization {
                Normalization::None => None,
                Normalization::BatchNorm => Some(NormLayer::Batch {
                    param: config.batch_norm,
                    running: RunningStats::new(dim),
                }),
                Normalization::LayerNorm => Some(NormLayer::Layer(config.layer_norm)),
            })
            .collect();

        let dropout = (keep != 1.0).then(|| DropoutParam {
            seed: config.seed,
            ..DropoutParam::new(keep)
        });

        log::debug!(
            "fully connected net: dims {:?}, normalization={}, dropout_keep={}, reg={}",
            dims,
            config.normalization,
            keep,
            config.reg
        );

        Ok(FullyConnectedNet {
            params,
            norm_layers,
            dropout,
            reg: config.reg,
            loss: config.loss,
        })
    }

    /// Normalization state of each hidden layer, including batch norm running statistics
    pub fn norm_layers(&self) -> &[NormLayer] {
        &self.norm_layers
    }

    pub fn num_layers(&self) -> usize {
        self.params.len()
    }

    fn forward(&self, x: &Array2<f64>, mode: Mode) -> Result<ForwardPass> {
        // `new` always builds the output layer
        let Some((output, hidden_params)) = self.params.split_last() else {
            return Err(Error::ShapeMismatch {
                expected: vec![1],
                actual: vec![0],
            });
        };

        let mut hidden = Vec::with_capacity(hidden_params.len());
        let mut norm_layers = Vec::with_capacity(self.norm_layers.len());
        let mut h = x.clone();

        for (i, layer) in hidden_params.iter().enumerate() {
            let (out, block) = match (self.norm_layers.get(i), &layer.scale_shift) {
                (Some(norm), Some(ScaleShift { gamma, beta })) => {
                    let (out, cache, next) =
                        affine_norm_relu_forward(&h, &layer.weights, &layer.bias, gamma, beta, norm, mode)?;
                    norm_layers.push(next);
                    (out, HiddenBlock::Normalized(cache))
                }
                _ => {
                    let (out, cache) = affine_relu_forward(&h, &layer.weights, &layer.bias)?;
                    (out, HiddenBlock::Plain(cache))
                }
            };

            let (out, dropout) = match &self.dropout {
                Some(param) => {
                    // Distinct but reproducible mask per layer
                    let param = DropoutParam {
                        mode,
                        seed: param.seed.map(|seed| seed.wrapping_add(i as u64)),
                        ..*param
                    };
                    let (out, cache) = dropout_forward(&out, &param)?;
                    (out, Some(cache))
                }
                None => (out, None),
            };

            log::trace!("hidden layer {i}: {:?}", out.dim());
            hidden.push(HiddenCache { block, dropout });
            h = out;
        }

        let (scores, output) = affine_forward(&h, &output.weights, &output.bias)?;
        Ok(ForwardPass {
            scores,
            hidden,
            output,
            norm_layers,
        })
    }
}

impl Classifier for FullyConnectedNet {
    fn scores<D: Dimension>(&self, x: &Array<f64, D>) -> Result<Array2<f64>> {
        let x = flatten_rows(x)?;
        Ok(self.forward(&x, Mode::Test)?.scores)
    }

    fn loss<D: Dimension>(&mut self, x: &Array<f64, D>, labels: &[usize]) -> Result<(f64, Vec<LayerParams>)> {
        let x = flatten_rows(x)?;
        let ForwardPass {
            scores,
            hidden,
            output,
            norm_layers,
        } = self.forward(&x, Mode::Train)?;

        let (data_loss, dscores) = self.loss.compute(&scores, labels)?;

        let (mut dout, dw, db) = affine_backward(&dscores, output)?;
        let output_grads = LayerParams {
            weights: dw,
            bias: db,
            scale_shift: None,
        };

        let mut grads = Vec::with_capacity(self.params.len());
        for cache in hidden.into_iter().rev() {
            if let Some(dropout) = cache.dropout {
                dout = dropout_backward(&dout, dropout)?;
            }
            let (dx, layer_grads) = match cache.block {
                HiddenBlock::Plain(cache) => {
                    let (dx, dw, db) = affine_relu_backward(&dout, cache)?;
                    (dx, LayerParams { weights: dw, bias: db, scale_shift: None })
                }
                HiddenBlock::Normalized(cache) => {
                    let (dx, dw, db, dgamma, dbeta) = affine_norm_relu_backward(&dout, cache)?;
                    let scale_shift = Some(ScaleShift {
                        gamma: dgamma,
                        beta: dbeta,
                    });
                    (dx, LayerParams { weights: dw, bias: db, scale_shift })
                }
            };
            grads.push(layer_grads);
            dout = dx;
        }
        grads.reverse();
        grads.push(output_grads);

        let reg_loss = regularize(&self.params, &mut grads, self.reg);
        log::debug!("data loss {data_loss:.6}, reg loss {reg_loss:.6}");

        self.norm_layers = norm_layers;
        Ok((data_loss + reg_loss, grads))
    }

    fn params(&self) -> &[LayerParams] {
        &self.params
    }

    fn params_mut(&mut self) -> &mut [LayerParams] {
        &mut self.params
    }
}
