//! Fixed-topology network construction.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::Result;
use crate::neural::layer::{Activation, DenseLayer};
use crate::neural::network::{CompileConfig, RegressionNetwork};

/// Hidden and output layers of every growth estimator, input side first.
pub const TOPOLOGY: [(usize, Activation); 4] = [
    (16, Activation::Relu),
    (16, Activation::Relu),
    (4, Activation::Relu),
    (1, Activation::Linear),
];

/// Builds compiled, untrained regression networks.
#[derive(Debug, Clone)]
pub struct ModelBuilder {
    learning_rate: f32,
    seed: Option<u64>,
}

impl ModelBuilder {
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            seed: None,
        }
    }

    /// Makes weight initialization reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Builds the 16-16-4-1 network for `input_features` inputs, compiled
    /// with RMSprop, MSE loss and MAE metric.
    pub fn build(&self, input_features: usize) -> Result<RegressionNetwork> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut inputs = input_features;
        let mut layers = Vec::with_capacity(TOPOLOGY.len());
        for (units, activation) in TOPOLOGY {
            layers.push(DenseLayer::glorot(inputs, units, activation, &mut rng));
            inputs = units;
        }

        let mut network = RegressionNetwork::new(layers)?;
        network.compile(CompileConfig::rmsprop(self.learning_rate));
        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neural::network::LayerSpec;

    #[test]
    fn test_builds_fixed_topology() {
        let network = ModelBuilder::new(0.0155).build(4).unwrap();
        let spec = network.spec();

        assert_eq!(spec.input_features, 4);
        assert_eq!(
            spec.layers,
            vec![
                LayerSpec { units: 16, activation: Activation::Relu },
                LayerSpec { units: 16, activation: Activation::Relu },
                LayerSpec { units: 4, activation: Activation::Relu },
                LayerSpec { units: 1, activation: Activation::Linear },
            ]
        );
        assert_eq!(network.num_parameters(), 4 * 16 + 16 + 16 * 16 + 16 + 16 * 4 + 4 + 4 + 1);
    }

    #[test]
    fn test_compiled_with_rmsprop() {
        let network = ModelBuilder::new(0.02).build(3).unwrap();
        let compile = network.compile_config().expect("compiled");
        assert_eq!(compile, &CompileConfig::rmsprop(0.02));
        assert_eq!(network.optimizer().map(|opt| opt.tracked_parameters()), Some(0));
    }

    #[test]
    fn test_seeded_builds_are_identical() {
        let a = ModelBuilder::new(0.01).with_seed(42).build(4).unwrap();
        let b = ModelBuilder::new(0.01).with_seed(42).build(4).unwrap();
        let c = ModelBuilder::new(0.01).with_seed(43).build(4).unwrap();
        assert_eq!(a.weights(), b.weights());
        assert_ne!(a.weights(), c.weights());
    }
}
