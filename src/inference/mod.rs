//! Inference module for model prediction
//!
//! This module provides:
//! - Image preprocessing from raw bytes to the model input
//! - The `Classifier` service trait and arg-max decoding
//! - A burn-backed classifier loaded from a trained artifact

pub mod predictor;
pub mod preprocess;

// Re-export main types for convenience
pub use predictor::{decode_prediction, BurnClassifier, Classifier, Prediction};
pub use preprocess::{prepare_file, prepare_image, prepare_image_with_size, ImageTensor};
