use thiserror::Error;

/// Errors raised by the layer primitives and the network containers
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid forward batchnorm mode \"{0}\"")]
    InvalidMode(String),

    #[error("invalid normalization \"{0}\", expected \"batchnorm\", \"layernorm\" or \"none\"")]
    InvalidNormalization(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{groups} groups do not evenly divide {channels} channels")]
    GroupCount { channels: usize, groups: usize },

    #[error("window {window} with pad {pad} and stride {stride} does not tile an extent of {extent}")]
    Geometry {
        extent: usize,
        window: usize,
        pad: usize,
        stride: usize,
    },

    #[error("label {label} out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("empty batch")]
    EmptyBatch,

    #[error("keep probability must lie in (0, 1], got {0}")]
    KeepProbability(f64),

    #[error(transparent)]
    Shape(#[from] ndarray::ShapeError),

    #[error(transparent)]
    Distribution(#[from] rand_distr::NormalError),
}

pub type Result<T> = std::result::Result<T, Error>;
