//! Regression loss and metric.

use ndarray::{Array2, ArrayView1, ArrayView2};

/// Computes mean squared error loss with gradients.
///
/// `predicted` is the `(batch, 1)` network output.
///
/// # Returns
///
/// Tuple of (loss value, gradient w.r.t. predicted)
pub fn mse_loss_with_gradients(
    predicted: ArrayView2<f32>,
    target: ArrayView1<f32>,
) -> (f32, Array2<f32>) {
    let n = predicted.nrows().max(1) as f32;
    let diff = Array2::from_shape_fn(predicted.raw_dim(), |(row, col)| {
        predicted[[row, col]] - target[row]
    });

    // Loss = mean((predicted - target)^2)
    let loss = diff.iter().map(|d| d * d).sum::<f32>() / n;

    // Gradient = 2 * (predicted - target) / N
    let gradient = diff * (2.0 / n);

    (loss, gradient)
}

/// Mean absolute error between the first output column and `target`.
pub fn mean_absolute_error(predicted: ArrayView2<f32>, target: ArrayView1<f32>) -> f32 {
    if target.is_empty() {
        return 0.0;
    }

    predicted
        .column(0)
        .iter()
        .zip(target.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f32>()
        / target.len() as f32
}
