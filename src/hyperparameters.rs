use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::layers::{BatchNormParam, LayerNormParam};
use crate::loss::Loss;

/// Normalization applied to every hidden layer of a [`FullyConnectedNet`](crate::FullyConnectedNet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Normalization {
    #[default]
    None,
    BatchNorm,
    LayerNorm,
}

impl FromStr for Normalization {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Normalization::None),
            "batchnorm" => Ok(Normalization::BatchNorm),
            "layernorm" => Ok(Normalization::LayerNorm),
            other => Err(Error::InvalidNormalization(other.to_string())),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalization::None => write!(f, "none"),
            Normalization::BatchNorm => write!(f, "batchnorm"),
            Normalization::LayerNorm => write!(f, "layernorm"),
        }
    }
}

/// Hyperparameters for the affine - relu - affine - softmax network
#[derive(Debug, Clone)]
pub struct TwoLayerConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,

    /// Standard deviation of the initial weights
    pub weight_scale: f64,

    /// L2 regularization strength
    pub reg: f64,

    /// Seeds weight initialization when set
    pub seed: Option<u64>,

    pub loss: Loss,
}

impl Default for TwoLayerConfig {
    fn default() -> Self {
        TwoLayerConfig {
            input_dim: 3 * 32 * 32,
            hidden_dim: 100,
            num_classes: 10,
            weight_scale: 1e-3,
            reg: 0.0,
            seed: None,
            loss: Loss::Softmax,
        }
    }
}

/// Hyperparameters for a fully-connected network of arbitrary depth
#[derive(Debug, Clone)]
pub struct FullyConnectedConfig {
    /// Size of each hidden layer, in order
    pub hidden_dims: Vec<usize>,
    pub input_dim: usize,
    pub num_classes: usize,

    /// Probability of keeping a hidden activation. 1.0 disables dropout.
    pub dropout_keep: f64,

    pub normalization: Normalization,

    /// L2 regularization strength
    pub reg: f64,

    /// Standard deviation of the initial weights
    pub weight_scale: f64,

    /// Seeds weight initialization and the dropout masks when set
    pub seed: Option<u64>,

    /// eps/momentum shared by every batch norm layer; the mode is set per pass
    pub batch_norm: BatchNormParam,

    pub layer_norm: LayerNormParam,

    pub loss: Loss,
}

impl Default for FullyConnectedConfig {
    fn default() -> Self {
        FullyConnectedConfig {
            hidden_dims: vec![100, 100],
            input_dim: 3 * 32 * 32,
            num_classes: 10,
            dropout_keep: 1.0,
            normalization: Normalization::None,
            reg: 0.0,
            weight_scale: 1e-2,
            seed: None,
            batch_norm: BatchNormParam::default(),
            layer_norm: LayerNormParam::default(),
            loss: Loss::Softmax,
        }
    }
}
