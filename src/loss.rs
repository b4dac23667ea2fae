use ndarray::{Array2, Axis};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Loss {
    #[default]
    Softmax,
    Svm,
}

impl Loss {
    /// Loss over a batch of class scores and the gradient w.r.t. the scores
    pub fn compute(&self, scores: &Array2<f64>, labels: &[usize]) -> Result<(f64, Array2<f64>)> {
        match self {
            Loss::Softmax => softmax_loss(scores, labels),
            Loss::Svm => svm_loss(scores, labels),
        }
    }
}

fn check_labels(scores: &Array2<f64>, labels: &[usize]) -> Result<()> {
    let (n, classes) = scores.dim();
    if n == 0 {
        return Err(Error::EmptyBatch);
    }
    if labels.len() != n {
        return Err(Error::ShapeMismatch {
            expected: vec![n],
            actual: vec![labels.len()],
        });
    }
    if let Some(&label) = labels.iter().find(|&&label| label >= classes) {
        return Err(Error::LabelOutOfRange { label, classes });
    }
    Ok(())
}

/// Softmax (cross-entropy) loss.
///
/// # Arguments
///
/// * `scores` - Shape `(N, C)`, `scores[[i, j]]` is the score of class `j` for example `i`
/// * `labels` - `labels[i]` is the class of example `i`, `0 <= labels[i] < C`
///
/// # Returns
///
/// Mean negative log-likelihood and its gradient w.r.t. `scores`
pub fn softmax_loss(scores: &Array2<f64>, labels: &[usize]) -> Result<(f64, Array2<f64>)> {
    check_labels(scores, labels)?;
    let n = scores.nrows() as f64;

    // Subtract the row max so exp never overflows
    let row_max = scores.map_axis(Axis(1), |row| row.fold(f64::NEG_INFINITY, |m, &v| m.max(v)));
    let shifted = scores - &row_max.insert_axis(Axis(1));
    let log_z = shifted.mapv(f64::exp).sum_axis(Axis(1)).mapv(f64::ln);
    let log_probs = shifted - &log_z.insert_axis(Axis(1));

    let loss = -labels
        .iter()
        .enumerate()
        .map(|(i, &y)| log_probs[[i, y]])
        .sum::<f64>()
        / n;

    let mut dx = log_probs.mapv(f64::exp);
    for (i, &y) in labels.iter().enumerate() {
        dx[[i, y]] -= 1.0;
    }
    dx /= n;
    Ok((loss, dx))
}

/// Multiclass SVM (hinge) loss with a margin of 1.
///
/// Takes the same arguments as [`softmax_loss`].
pub fn svm_loss(scores: &Array2<f64>, labels: &[usize]) -> Result<(f64, Array2<f64>)> {
    check_labels(scores, labels)?;
    let n = scores.nrows() as f64;

    let mut margins = Array2::<f64>::zeros(scores.raw_dim());
    for (i, (row, &y)) in scores.rows().into_iter().zip(labels).enumerate() {
        let correct = row[y];
        for (j, &s) in row.iter().enumerate() {
            if j != y {
                margins[[i, j]] = (s - correct + 1.0).max(0.0);
            }
        }
    }
    let loss = margins.sum() / n;

    let mut dx = margins.mapv(|m| if m > 0.0 { 1.0 } else { 0.0 });
    for (i, &y) in labels.iter().enumerate() {
        let violated = dx.row(i).sum();
        dx[[i, y]] -= violated;
    }
    dx /= n;
    Ok((loss, dx))
}
