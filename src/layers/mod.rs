pub mod affine;
pub mod batch_norm;
pub mod composite;
pub mod conv2d;
pub mod dropout;
pub mod group_norm;
pub mod layer_norm;
pub mod max_pool;
pub mod normalization;

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Whether a forward pass is part of training or inference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Test,
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            other => Err(Error::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Train => write!(f, "train"),
            Mode::Test => write!(f, "test"),
        }
    }
}

/// Number of window positions along one spatial axis.
///
/// `1 + (extent + 2 * pad - window) / stride`, rejected unless the division is exact.
pub(crate) fn output_extent(extent: usize, window: usize, pad: usize, stride: usize) -> Result<usize> {
    let padded = extent + 2 * pad;
    if stride == 0 || window == 0 || window > padded || (padded - window) % stride != 0 {
        return Err(Error::Geometry { extent, window, pad, stride });
    }
    Ok(1 + (padded - window) / stride)
}

pub use affine::{affine_backward, affine_forward, AffineCache};
pub use batch_norm::{
    batchnorm_backward, batchnorm_backward_alt, batchnorm_forward, spatial_batchnorm_backward,
    spatial_batchnorm_forward, BatchNormCache, BatchNormParam, RunningStats, SpatialBatchNormCache,
};
pub use composite::{
    affine_norm_relu_backward, affine_norm_relu_forward, affine_relu_backward, affine_relu_forward,
    AffineNormReluCache, AffineReluCache,
};
pub use conv2d::{conv_backward_naive, conv_forward_naive, ConvCache, ConvParam};
pub use dropout::{dropout_backward, dropout_forward, DropoutCache, DropoutParam};
pub use group_norm::{spatial_groupnorm_backward, spatial_groupnorm_forward, GroupNormCache, GroupNormParam};
pub use layer_norm::{layernorm_backward, layernorm_forward, LayerNormCache, LayerNormParam};
pub use max_pool::{max_pool_backward_naive, max_pool_forward_naive, PoolCache, PoolParam};
pub use normalization::{NormCache, NormGradients, NormLayer};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!("train".parse::<Mode>().unwrap(), Mode::Train);
        assert_eq!("test".parse::<Mode>().unwrap(), Mode::Test);

        let err = "eval".parse::<Mode>().unwrap_err();
        assert!(matches!(err, Error::InvalidMode(ref s) if s == "eval"));
        assert_eq!(err.to_string(), "invalid forward batchnorm mode \"eval\"");
    }

    #[test]
    fn test_output_extent() {
        assert_eq!(output_extent(32, 3, 1, 1).unwrap(), 32);
        assert_eq!(output_extent(4, 2, 0, 2).unwrap(), 2);
        assert_eq!(output_extent(5, 5, 0, 1).unwrap(), 1);
    }

    #[test]
    fn test_output_extent_rejects_partial_windows() {
        assert!(matches!(output_extent(5, 2, 0, 2), Err(Error::Geometry { extent: 5, .. })));
        assert!(matches!(output_extent(2, 3, 0, 1), Err(Error::Geometry { .. })));
        assert!(matches!(output_extent(4, 2, 0, 0), Err(Error::Geometry { .. })));
    }
}
