//! Fully connected layer with an element-wise activation.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Activation applied after the affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Rectified linear unit
    Relu,
    /// Identity (regression output)
    Linear,
}

impl Activation {
    fn apply(&self, z: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => z.mapv(|v| v.max(0.0)),
            Activation::Linear => z.clone(),
        }
    }

    fn derivative(&self, z: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
            Activation::Linear => Array2::ones(z.raw_dim()),
        }
    }
}

/// Intermediate values of a forward pass, needed by backpropagation.
#[derive(Debug, Clone)]
pub struct LayerCache {
    pub input: Array2<f32>,
    pub pre_activation: Array2<f32>,
}

/// Gradients of one layer's parameters.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

/// A dense layer.
///
/// # Architecture
///
/// ```text
/// input (batch × inputs) → input · Wᵀ + b → activation → output (batch × units)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Learnable weights, `[units, inputs]`
    pub weights: Array2<f32>,
    /// Learnable bias, `[units]`
    pub bias: Array1<f32>,
    pub activation: Activation,
}

impl DenseLayer {
    /// Creates a layer with Glorot-uniform weights and zero bias.
    pub fn glorot<R: Rng>(inputs: usize, units: usize, activation: Activation, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + units) as f32).sqrt();
        let weights = Array2::from_shape_fn((units, inputs), |_| rng.gen_range(-limit..=limit));

        Self {
            weights,
            bias: Array1::zeros(units),
            activation,
        }
    }

    /// Creates a layer with all parameters set to zero.
    pub fn zeros(inputs: usize, units: usize, activation: Activation) -> Self {
        Self {
            weights: Array2::zeros((units, inputs)),
            bias: Array1::zeros(units),
            activation,
        }
    }

    pub fn inputs(&self) -> usize {
        self.weights.ncols()
    }

    pub fn units(&self) -> usize {
        self.weights.nrows()
    }

    /// Forward pass without caching.
    pub fn forward(&self, input: ArrayView2<f32>) -> Array2<f32> {
        let z = input.dot(&self.weights.t()) + &self.bias;
        self.activation.apply(&z)
    }

    /// Forward pass returning the values the backward pass needs.
    pub fn forward_with_cache(&self, input: ArrayView2<f32>) -> (Array2<f32>, LayerCache) {
        let z = input.dot(&self.weights.t()) + &self.bias;
        let output = self.activation.apply(&z);
        let cache = LayerCache {
            input: input.to_owned(),
            pre_activation: z,
        };
        (output, cache)
    }

    /// Backward pass.
    ///
    /// Returns (gradient w.r.t. input, parameter gradients).
    pub fn backward(
        &self,
        grad_output: &Array2<f32>,
        cache: &LayerCache,
    ) -> (Array2<f32>, LayerGradients) {
        let grad_z = grad_output * &self.activation.derivative(&cache.pre_activation);

        let grad_weights = grad_z.t().dot(&cache.input);
        let grad_bias = grad_z.sum_axis(Axis(0));
        let grad_input = grad_z.dot(&self.weights);

        (
            grad_input,
            LayerGradients {
                weights: grad_weights,
                bias: grad_bias,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_layer_creation() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let layer = DenseLayer::glorot(4, 16, Activation::Relu, &mut rng);
        assert_eq!(layer.weights.dim(), (16, 4));
        assert_eq!(layer.bias.len(), 16);

        let limit = (6.0f32 / 20.0).sqrt();
        assert!(layer.weights.iter().all(|w| w.abs() <= limit));
        assert!(layer.bias.iter().all(|&b| b == 0.0));
    }

    #[test]
    fn test_relu_forward_clamps_negatives() {
        let layer = DenseLayer {
            weights: array![[1.0, -1.0]],
            bias: array![0.5],
            activation: Activation::Relu,
        };
        let out = layer.forward(array![[1.0, 3.0], [3.0, 1.0]].view());
        assert_eq!(out, array![[0.0], [2.5]]);
    }

    #[test]
    fn test_backward_matches_finite_difference() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let layer = DenseLayer::glorot(3, 2, Activation::Linear, &mut rng);
        let input = array![[0.3, -0.2, 0.9]];

        // loss = sum(output), so grad_output is all ones
        let (_, cache) = layer.forward_with_cache(input.view());
        let (_, grads) = layer.backward(&Array2::ones((1, 2)), &cache);

        let eps = 1e-3;
        let mut bumped = layer.clone();
        bumped.weights[[1, 2]] += eps;
        let numeric = (bumped.forward(input.view()).sum() - layer.forward(input.view()).sum()) / eps;
        assert!((numeric - grads.weights[[1, 2]]).abs() < 1e-2);
        assert_eq!(grads.bias, array![1.0, 1.0]);
    }
}
