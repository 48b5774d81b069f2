//! Feed-forward regression network.

use std::path::Path;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointError, Checkpointable};
use crate::error::{GrowthError, Result};
use crate::neural::layer::{Activation, DenseLayer};
use crate::neural::loss::{mean_absolute_error, mse_loss_with_gradients};
use crate::neural::optimizer::RmsPropOptimizer;

const WEIGHTS_CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    RmsProp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    Mse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Mae,
}

/// Optimizer, loss and metric a network is trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompileConfig {
    pub optimizer: OptimizerKind,
    pub learning_rate: f32,
    pub loss: LossKind,
    pub metrics: Vec<MetricKind>,
}

impl CompileConfig {
    /// RMSprop + MSE loss + MAE metric.
    pub fn rmsprop(learning_rate: f32) -> Self {
        Self {
            optimizer: OptimizerKind::RmsProp,
            learning_rate,
            loss: LossKind::Mse,
            metrics: vec![MetricKind::Mae],
        }
    }
}

/// Structural description of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub units: usize,
    pub activation: Activation,
}

/// Structural description of a network, sufficient to rebuild it before
/// loading weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub input_features: usize,
    pub layers: Vec<LayerSpec>,
    #[serde(default)]
    pub compile: Option<CompileConfig>,
}

impl NetworkSpec {
    /// Rebuilds the network with zeroed parameters.
    pub fn build_zeroed(&self) -> Result<RegressionNetwork> {
        let mut inputs = self.input_features;
        let mut layers = Vec::with_capacity(self.layers.len());
        for spec in &self.layers {
            layers.push(DenseLayer::zeros(inputs, spec.units, spec.activation));
            inputs = spec.units;
        }
        RegressionNetwork::new(layers)
    }

    /// Checks that `weights` has exactly the tensor shapes this layout implies.
    pub fn validate_weights(&self, weights: &NetworkWeights) -> std::result::Result<(), CheckpointError> {
        if self.layers.len() != weights.layers.len() {
            return Err(CheckpointError::InvalidFormat(format!(
                "Layer count mismatch: expected {}, found {}",
                self.layers.len(),
                weights.layers.len()
            )));
        }

        let mut inputs = self.input_features;
        for (index, (spec, layer)) in self.layers.iter().zip(&weights.layers).enumerate() {
            let expected = (spec.units, inputs);
            if (layer.units, layer.inputs) != expected {
                return Err(CheckpointError::InvalidFormat(format!(
                    "Layer {index} shape mismatch: expected {:?}, found {:?}",
                    expected,
                    (layer.units, layer.inputs)
                )));
            }
            if layer.weights.len() != spec.units * inputs || layer.bias.len() != spec.units {
                return Err(CheckpointError::InvalidFormat(format!(
                    "Layer {index} parameter count does not match its shape"
                )));
            }
            inputs = spec.units;
        }

        Ok(())
    }
}

/// Parameters of one layer as stored in the weight blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerWeights {
    pub units: usize,
    pub inputs: usize,
    /// Row-major `[units, inputs]`
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

/// Learned parameters of a whole network (the weight blob).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    version: u32,
    pub layers: Vec<LayerWeights>,
}

impl Checkpointable for NetworkWeights {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> std::result::Result<(), CheckpointError> {
        Self::write_snapshot(self, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> std::result::Result<Self, CheckpointError> {
        let snapshot: NetworkWeights = Self::read_snapshot(path)?;
        if snapshot.version != WEIGHTS_CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: WEIGHTS_CHECKPOINT_VERSION,
                found: snapshot.version,
            });
        }
        Ok(snapshot)
    }
}

/// Aggregate loss and metric over a data set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub loss: f32,
    pub mean_absolute_error: f32,
}

/// Stack of dense layers ending in a single linear unit.
#[derive(Debug, Clone)]
pub struct RegressionNetwork {
    layers: Vec<DenseLayer>,
    compile: Option<CompileConfig>,
    optimizer: Option<RmsPropOptimizer>,
}

impl RegressionNetwork {
    /// Wraps `layers`, checking that consecutive layer widths agree and that
    /// the last layer has a single output unit.
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self> {
        let last = layers
            .last()
            .ok_or_else(|| GrowthError::InsufficientData("network has no layers".into()))?;
        if last.units() != 1 {
            return Err(GrowthError::shape("output layer units", 1, last.units()));
        }
        for pair in layers.windows(2) {
            if pair[1].inputs() != pair[0].units() {
                return Err(GrowthError::shape(
                    "layer input width",
                    pair[0].units(),
                    pair[1].inputs(),
                ));
            }
        }

        Ok(Self {
            layers,
            compile: None,
            optimizer: None,
        })
    }

    /// Attaches the training configuration and a fresh optimizer state.
    pub fn compile(&mut self, config: CompileConfig) {
        let optimizer = match config.optimizer {
            OptimizerKind::RmsProp => RmsPropOptimizer::new(config.learning_rate),
        };
        self.optimizer = Some(optimizer);
        self.compile = Some(config);
    }

    pub fn compile_config(&self) -> Option<&CompileConfig> {
        self.compile.as_ref()
    }

    pub fn optimizer(&self) -> Option<&RmsPropOptimizer> {
        self.optimizer.as_ref()
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    /// Number of features each input row must carry.
    pub fn input_width(&self) -> usize {
        self.layers.first().map(DenseLayer::inputs).unwrap_or(0)
    }

    pub fn num_parameters(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| layer.weights.len() + layer.bias.len())
            .sum()
    }

    pub fn spec(&self) -> NetworkSpec {
        NetworkSpec {
            input_features: self.input_width(),
            layers: self
                .layers
                .iter()
                .map(|layer| LayerSpec {
                    units: layer.units(),
                    activation: layer.activation,
                })
                .collect(),
            compile: self.compile.clone(),
        }
    }

    pub fn weights(&self) -> NetworkWeights {
        NetworkWeights {
            version: WEIGHTS_CHECKPOINT_VERSION,
            layers: self
                .layers
                .iter()
                .map(|layer| LayerWeights {
                    units: layer.units(),
                    inputs: layer.inputs(),
                    weights: layer.weights.iter().copied().collect(),
                    bias: layer.bias.to_vec(),
                })
                .collect(),
        }
    }

    /// Replaces all parameters; shapes must match the current layers.
    pub fn set_weights(&mut self, weights: NetworkWeights) -> std::result::Result<(), CheckpointError> {
        let spec = self.spec();
        spec.validate_weights(&weights)?;

        for (layer, stored) in self.layers.iter_mut().zip(weights.layers) {
            layer.weights = Array2::from_shape_vec((stored.units, stored.inputs), stored.weights)
                .map_err(|err| CheckpointError::InvalidFormat(err.to_string()))?;
            layer.bias = Array1::from_vec(stored.bias);
        }
        Ok(())
    }

    fn check_width(&self, features: &ArrayView2<f32>) -> Result<()> {
        if features.ncols() != self.input_width() {
            return Err(GrowthError::shape(
                "network input",
                self.input_width(),
                features.ncols(),
            ));
        }
        Ok(())
    }

    fn forward(&self, features: ArrayView2<f32>) -> Array2<f32> {
        let mut activation = features.to_owned();
        for layer in &self.layers {
            activation = layer.forward(activation.view());
        }
        activation
    }

    /// One scalar prediction per input row.
    pub fn predict(&self, features: ArrayView2<f32>) -> Result<Array1<f32>> {
        self.check_width(&features)?;
        Ok(self.forward(features).column(0).to_owned())
    }

    /// Trains on one mini-batch and returns its loss.
    pub fn train_batch(&mut self, features: ArrayView2<f32>, targets: ArrayView1<f32>) -> Result<f32> {
        self.check_width(&features)?;
        if features.nrows() != targets.len() {
            return Err(GrowthError::shape("batch targets", features.nrows(), targets.len()));
        }
        let optimizer = self.optimizer.as_mut().ok_or(GrowthError::NotCompiled)?;

        // Forward pass
        let mut caches = Vec::with_capacity(self.layers.len());
        let mut activation = features.to_owned();
        for layer in &self.layers {
            let (output, cache) = layer.forward_with_cache(activation.view());
            caches.push(cache);
            activation = output;
        }

        let (loss, mut grad) = mse_loss_with_gradients(activation.view(), targets);

        // Backward pass - collect gradients first
        let mut layer_gradients = Vec::with_capacity(self.layers.len());
        for (layer, cache) in self.layers.iter().zip(&caches).rev() {
            let (grad_input, gradients) = layer.backward(&grad, cache);
            layer_gradients.push(gradients);
            grad = grad_input;
        }

        // Now update parameters
        layer_gradients.reverse();
        for (index, (layer, gradients)) in self.layers.iter_mut().zip(layer_gradients).enumerate() {
            optimizer.step(&format!("layer{index}_weights"), &mut layer.weights, &gradients.weights);
            optimizer.step(&format!("layer{index}_bias"), &mut layer.bias, &gradients.bias);
        }

        Ok(loss)
    }

    /// Runs one epoch of shuffled mini-batch training; returns the mean batch loss.
    pub fn fit_epoch<R: Rng>(
        &mut self,
        features: ArrayView2<f32>,
        targets: ArrayView1<f32>,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<f32> {
        if features.nrows() != targets.len() {
            return Err(GrowthError::shape("training targets", features.nrows(), targets.len()));
        }
        if features.nrows() == 0 {
            return Err(GrowthError::InsufficientData("empty training set".into()));
        }

        let mut indices: Vec<usize> = (0..features.nrows()).collect();
        indices.shuffle(rng);

        let mut total_loss = 0.0;
        let mut batches = 0;
        for batch in indices.chunks(batch_size.max(1)) {
            let x = features.select(Axis(0), batch);
            let y = targets.select(Axis(0), batch);
            total_loss += self.train_batch(x.view(), y.view())?;
            batches += 1;
        }

        Ok(total_loss / batches as f32)
    }

    /// Loss and MAE over a full data set.
    pub fn evaluate(&self, features: ArrayView2<f32>, targets: ArrayView1<f32>) -> Result<Evaluation> {
        self.check_width(&features)?;
        if features.nrows() != targets.len() {
            return Err(GrowthError::shape("evaluation targets", features.nrows(), targets.len()));
        }

        let output = self.forward(features);
        let (loss, _) = mse_loss_with_gradients(output.view(), targets);
        Ok(Evaluation {
            loss,
            mean_absolute_error: mean_absolute_error(output.view(), targets),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn tiny_network(seed: u64) -> RegressionNetwork {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut net = RegressionNetwork::new(vec![
            DenseLayer::glorot(2, 8, Activation::Relu, &mut rng),
            DenseLayer::glorot(8, 1, Activation::Linear, &mut rng),
        ])
        .unwrap();
        net.compile(CompileConfig::rmsprop(0.01));
        net
    }

    fn linear_data() -> (Array2<f32>, Array1<f32>) {
        let x = Array2::from_shape_fn((64, 2), |(r, c)| ((r * (c + 3)) % 17) as f32 / 8.0 - 1.0);
        let y = x.map_axis(Axis(1), |row| 2.0 * row[0] - row[1] + 0.5);
        (x, y)
    }

    #[test]
    fn test_rejects_mismatched_layers() {
        let err = RegressionNetwork::new(vec![
            DenseLayer::zeros(2, 4, Activation::Relu),
            DenseLayer::zeros(3, 1, Activation::Linear),
        ])
        .unwrap_err();
        assert!(matches!(err, GrowthError::ShapeMismatch { expected: 4, got: 3, .. }));
    }

    #[test]
    fn test_predict_checks_input_width() {
        let net = tiny_network(1);
        let err = net.predict(array![[1.0, 2.0, 3.0]].view()).unwrap_err();
        assert!(matches!(err, GrowthError::ShapeMismatch { expected: 2, got: 3, .. }));
    }

    #[test]
    fn test_training_requires_compile() {
        let mut net = RegressionNetwork::new(vec![DenseLayer::zeros(2, 1, Activation::Linear)]).unwrap();
        let err = net
            .train_batch(array![[1.0, 2.0]].view(), array![1.0].view())
            .unwrap_err();
        assert!(matches!(err, GrowthError::NotCompiled));
    }

    #[test]
    fn test_fit_reduces_loss() {
        let mut net = tiny_network(3);
        let (x, y) = linear_data();
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);

        let before = net.evaluate(x.view(), y.view()).unwrap();
        for _ in 0..60 {
            net.fit_epoch(x.view(), y.view(), 16, &mut rng).unwrap();
        }
        let after = net.evaluate(x.view(), y.view()).unwrap();

        assert!(after.loss < before.loss * 0.5, "{before:?} -> {after:?}");
        assert!(after.mean_absolute_error.is_finite());
        // Weights and bias of both layers carry optimizer state.
        assert_eq!(net.optimizer().map(|opt| opt.tracked_parameters()), Some(4));
    }

    #[test]
    fn test_weights_roundtrip_preserves_predictions() {
        let net = tiny_network(5);
        let mut restored = net.spec().build_zeroed().unwrap();
        restored.set_weights(net.weights()).unwrap();

        let x = array![[0.2, -0.7], [1.5, 0.3]];
        assert_eq!(net.predict(x.view()).unwrap(), restored.predict(x.view()).unwrap());
    }

    #[test]
    fn test_weight_validation_detects_mismatch() {
        let net = tiny_network(5);
        let mut weights = net.weights();
        weights.layers[0].units = 7;

        let err = net.spec().validate_weights(&weights).expect_err("mismatch");
        match err {
            CheckpointError::InvalidFormat(msg) => assert!(msg.contains("shape mismatch")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_weights_checkpoint_roundtrip() {
        let net = tiny_network(9);
        let mut path = std::env::temp_dir();
        path.push(format!("growth_weights_{}.bin", uuid::Uuid::new_v4()));

        net.weights().save_checkpoint(&path).expect("save checkpoint");
        let restored = NetworkWeights::load_checkpoint(&path).expect("load checkpoint");
        std::fs::remove_file(&path).ok();

        assert_eq!(restored, net.weights());
    }
}
