//! Model module built with the Burn framework
//!
//! This module provides:
//! - The MobileNetV2 backbone with stage-wise forward for partial freezing
//! - The classification head and full classifier
//! - Training/evaluation configuration
//! - Model artifact persistence (parameters + label metadata)
//!
//! ## Architecture
//!
//! ```text
//! [N,3,224,224] -> MobileNetV2 -> [N,1280,7,7] -> GAP -> Dense(128, relu)
//!               -> Dropout(0.5) -> Dense(num_classes) -> softmax
//! ```

pub mod artifact;
pub mod classifier;
pub mod config;
#[cfg(feature = "pytorch-import")]
pub mod import;
pub mod mobilenet;

// Re-export main types for convenience
pub use artifact::{load_artifact, save_artifact, ModelMetadata};
pub use classifier::{TomatoClassifier, TomatoClassifierConfig};
pub use config::{EvaluationConfig, TrainingConfig};
pub use mobilenet::MobileNetV2;
