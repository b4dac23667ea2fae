#![allow(dead_code)]

use layerwise::gradient_check::rel_error;
use ndarray::{Array, Dimension, ShapeBuilder};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

pub const STEP: f64 = 1e-5;
pub const TOLERANCE: f64 = 1e-6;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Standard normal samples of the given shape, reproducible per seed
pub fn randn<Sh, D>(shape: Sh, seed: u64) -> Array<f64, D>
where
    D: Dimension,
    Sh: ShapeBuilder<Dim = D>,
{
    let mut rng = StdRng::seed_from_u64(seed);
    Array::from_shape_fn(shape, |_| StandardNormal.sample(&mut rng))
}

/// Every element must satisfy `|a - n| <= tol * max(1, |a| + |n|)`
pub fn assert_grad_close<D: Dimension>(name: &str, analytic: &Array<f64, D>, numeric: &Array<f64, D>) {
    assert_eq!(analytic.shape(), numeric.shape(), "{name}: shape");
    for (a, n) in analytic.iter().zip(numeric.iter()) {
        let allowed = TOLERANCE * (a.abs() + n.abs()).max(1.0);
        assert!(
            (a - n).abs() <= allowed,
            "{name}: analytic {a} vs numeric {n}, rel_error {}",
            rel_error(analytic, numeric)
        );
    }
}
