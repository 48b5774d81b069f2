//! RMSprop optimizer for training regression networks.

use std::collections::HashMap;

use ndarray::{Array, ArrayD, Dimension, Zip};

/// Root-mean-square propagation.
///
/// Implements the update rule:
/// ```text
/// s = rho * s + (1 - rho) * gradient^2
/// parameter = parameter - learning_rate * gradient / (sqrt(s) + epsilon)
/// ```
#[derive(Debug, Clone)]
pub struct RmsPropOptimizer {
    /// Learning rate
    pub learning_rate: f32,
    /// Decay of the running mean of squared gradients
    pub rho: f32,
    /// Small constant for numerical stability
    pub epsilon: f32,
    /// Running mean of squared gradients per parameter
    mean_squares: HashMap<String, ArrayD<f32>>,
}

impl RmsPropOptimizer {
    /// Creates an optimizer with the usual defaults (`rho = 0.9`, `epsilon = 1e-7`).
    ///
    /// # Examples
    ///
    /// ```
    /// use growth_core::neural::RmsPropOptimizer;
    ///
    /// let optimizer = RmsPropOptimizer::new(0.0155);
    /// assert_eq!(optimizer.rho, 0.9);
    /// ```
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            rho: 0.9,
            epsilon: 1e-7,
            mean_squares: HashMap::new(),
        }
    }

    /// Updates a parameter in place.
    ///
    /// # Arguments
    ///
    /// * `param_name` - Unique identifier for this parameter
    /// * `param` - Parameter array to update
    /// * `gradient` - Gradient of the loss w.r.t. `param`
    pub fn step<D: Dimension>(
        &mut self,
        param_name: &str,
        param: &mut Array<f32, D>,
        gradient: &Array<f32, D>,
    ) {
        let mean_square = self
            .mean_squares
            .entry(param_name.to_string())
            .or_insert_with(|| ArrayD::zeros(param.shape()));
        if mean_square.shape() != param.shape() {
            *mean_square = ArrayD::zeros(param.shape());
        }

        let (rho, lr, eps) = (self.rho, self.learning_rate, self.epsilon);
        Zip::from(mean_square)
            .and(param.view_mut().into_dyn())
            .and(gradient.view().into_dyn())
            .for_each(|s, p, &g| {
                *s = rho * *s + (1.0 - rho) * g * g;
                *p -= lr * g / (s.sqrt() + eps);
            });
    }

    /// Number of parameters with accumulated state.
    pub fn tracked_parameters(&self) -> usize {
        self.mean_squares.len()
    }
}
