//! Training module
//!
//! This module provides:
//! - The two-phase transfer-learning pipeline (frozen backbone, then fine-tuning)
//! - Training history accumulation, JSON persistence and curve plotting
//!
//! ## Transfer Learning Approach
//!
//! 1. Attach a fresh classification head to the MobileNetV2 backbone
//! 2. Phase 1: train the head with every backbone stage frozen
//! 3. Phase 2: unfreeze the stages holding the last backbone layers and
//!    continue at a reduced learning rate
//! 4. Save the model artifact, the concatenated history and the curves

pub mod history;
pub mod transfer;

// Re-export main types for convenience
pub use history::{EpochMetrics, TrainingHistory};
pub use transfer::{run_training, TrainingOutcome};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
