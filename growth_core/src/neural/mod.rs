//! Neural network components for strain-growth regression.
//!
//! Dense layers, the MSE loss / MAE metric, the RMSprop optimizer and the
//! fixed 16-16-4-1 topology every estimator is built with.

pub mod builder;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optimizer;

pub use builder::{ModelBuilder, TOPOLOGY};
pub use layer::{Activation, DenseLayer};
pub use loss::{mean_absolute_error, mse_loss_with_gradients};
pub use network::{
    CompileConfig, Evaluation, LayerSpec, LayerWeights, NetworkSpec, NetworkWeights,
    RegressionNetwork,
};
pub use optimizer::RmsPropOptimizer;
