//! # Tomato Leaf Disease Classification
//!
//! A Rust library for classifying tomato leaf photographs into five health
//! categories using transfer learning on a MobileNetV2 backbone, built with
//! the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: Directory-per-class loading, validation split and augmentation
//! - `model`: MobileNetV2 backbone, classification head and model artifacts
//! - `training`: Two-phase transfer learning and training history
//! - `evaluation`: Accuracy, confusion matrix and classification report
//! - `inference`: Image preprocessing and the prediction interface
//! - `utils`: Logging, charts, error types and helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tomato_leaf::inference::{prepare_image, BurnClassifier, Classifier};
//!
//! let classifier = BurnClassifier::<DefaultBackend>::load("output/tomato_model", device)?;
//! let tensor = prepare_image(&std::fs::read("leaf.jpg")?)?;
//! let prediction = classifier.predict(&tensor)?;
//! println!("{} ({:.2})", prediction.label, prediction.confidence);
//! ```

pub mod backend;
pub mod dataset;
pub mod evaluation;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::loader::LeafDataset;
pub use dataset::split::ValidationSplit;
pub use evaluation::metrics::{ClassificationReport, ConfusionMatrix};
pub use inference::{decode_prediction, prepare_image, BurnClassifier, Classifier, ImageTensor, Prediction};
pub use model::classifier::{TomatoClassifier, TomatoClassifierConfig};
pub use model::config::{EvaluationConfig, TrainingConfig};
pub use training::history::TrainingHistory;
pub use utils::error::{Result, TomatoError};

/// Number of tomato leaf categories
pub const NUM_CLASSES: usize = 5;

/// Square input resolution expected by the model
pub const IMAGE_SIZE: usize = 224;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
