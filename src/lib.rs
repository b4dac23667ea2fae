//! Layer-wise building blocks for small neural networks on `ndarray`.
//!
//! Every layer is a pair of free functions: `*_forward` returns the output
//! together with a cache, and `*_backward` consumes that cache to produce the
//! gradients. The networks in [`model`] chain these primitives and hand back
//! one gradient record per layer for an [`Optimizer`] to apply.

pub mod activation;
mod error;
pub mod gradient_check;
mod hyperparameters;
pub mod layers;
pub mod loss;
pub mod model;
mod optimizer;

pub use error::{Error, Result};
pub use hyperparameters::{FullyConnectedConfig, Normalization, TwoLayerConfig};
pub use layers::Mode;
pub use loss::Loss;
pub use model::{Classifier, Evaluation, FullyConnectedNet, LayerParams, ScaleShift, TwoLayerNet};
pub use optimizer::Optimizer;
