//! Centered finite differences for checking hand-derived backward passes.

use ndarray::{indices, Array, Dimension, IntoDimension, Zip};

/// Largest elementwise `|a - b| / max(1e-8, |a| + |b|)`
pub fn rel_error<D: Dimension>(a: &Array<f64, D>, b: &Array<f64, D>) -> f64 {
    Zip::from(a)
        .and(b)
        .fold(0.0, |worst, &x, &y| {
            let err = (x - y).abs() / (x.abs() + y.abs()).max(1e-8);
            f64::max(worst, err)
        })
}

/// Numerical gradient of a scalar function at `x`.
///
/// Each element of `x` is nudged by `±h` in turn and restored afterwards.
pub fn eval_numerical_gradient<D, F>(mut f: F, x: &mut Array<f64, D>, h: f64) -> Array<f64, D>
where
    D: Dimension,
    F: FnMut(&Array<f64, D>) -> f64,
{
    let mut grad = Array::zeros(x.raw_dim());
    for pattern in indices(x.raw_dim()) {
        let idx = pattern.into_dimension();
        let old = x[idx.clone()];

        x[idx.clone()] = old + h;
        let plus = f(x);
        x[idx.clone()] = old - h;
        let minus = f(x);
        x[idx.clone()] = old;

        grad[idx] = (plus - minus) / (2.0 * h);
    }
    grad
}

/// Numerical gradient of `sum(f(x) * df)` at `x`, for array-valued `f`.
///
/// `df` is the upstream gradient of the output, so the result is directly
/// comparable to a backward pass fed with `df`.
pub fn eval_numerical_gradient_array<D, E, F>(
    mut f: F,
    x: &mut Array<f64, D>,
    df: &Array<f64, E>,
    h: f64,
) -> Array<f64, D>
where
    D: Dimension,
    E: Dimension,
    F: FnMut(&Array<f64, D>) -> Array<f64, E>,
{
    let mut grad = Array::zeros(x.raw_dim());
    for pattern in indices(x.raw_dim()) {
        let idx = pattern.into_dimension();
        let old = x[idx.clone()];

        x[idx.clone()] = old + h;
        let plus = f(x);
        x[idx.clone()] = old - h;
        let minus = f(x);
        x[idx.clone()] = old;

        grad[idx] = ((plus - minus) * df).sum() / (2.0 * h);
    }
    grad
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_rel_error() {
        let a = array![1.0, 2.0, 0.0];
        let b = array![1.0, 2.2, 0.0];

        assert_abs_diff_eq!(rel_error(&a, &a), 0.0);
        assert_abs_diff_eq!(rel_error(&a, &b), 0.2 / 4.2, epsilon = 1e-12);
    }

    #[test]
    fn test_scalar_gradient_of_quadratic() {
        let mut x = array![[1.0, -2.0], [0.5, 3.0]];
        let grad = eval_numerical_gradient(|x: &Array2<f64>| x.mapv(|v| v * v).sum(), &mut x, 1e-5);

        let expected = &x * 2.0;
        assert!(rel_error(&grad, &expected) < 1e-8);
        // x is restored
        assert_eq!(x, array![[1.0, -2.0], [0.5, 3.0]]);
    }

    #[test]
    fn test_array_gradient_weights_by_upstream() {
        let mut x = array![1.0, 2.0, 3.0];
        let df = array![1.0, 0.0, -2.0];
        let grad = eval_numerical_gradient_array(|x: &ndarray::Array1<f64>| x.mapv(|v| 3.0 * v), &mut x, &df, 1e-5);

        assert!(rel_error(&grad, &array![3.0, 0.0, -6.0]) < 1e-8);
    }
}
