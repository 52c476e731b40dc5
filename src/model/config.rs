//! Training and Evaluation Configuration
//!
//! Serde configuration structures for the training and evaluation pipelines.
//! Both can be stored as JSON; CLI flags override individual fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::utils::error::{Result, TomatoError};

/// Transfer-learning training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Dataset root: one subdirectory per class
    pub data_dir: PathBuf,

    /// Directory receiving the model artifact, history and plots
    pub output_dir: PathBuf,

    /// Artifact base name (`<name>.mpk` + `<name>.json`)
    pub model_name: String,

    /// Square input resolution
    pub image_size: usize,

    /// Batch size for training and validation
    pub batch_size: usize,

    /// Epochs training the head with the backbone frozen
    pub epochs_phase1: usize,

    /// Epochs fine-tuning the top of the backbone
    pub epochs_phase2: usize,

    /// Adam learning rate for phase 1
    pub learning_rate_phase1: f64,

    /// Adam learning rate for phase 2
    pub learning_rate_phase2: f64,

    /// Number of backbone layers, counted from the end of the Keras
    /// MobileNetV2 layer list, unfrozen in phase 2
    pub fine_tune_layers: usize,

    /// Fraction of each class held out for validation
    pub validation_split: f64,

    /// Units in the hidden layer of the head
    pub hidden_units: usize,

    /// Dropout after the hidden layer
    pub dropout: f64,

    /// Seed for shuffling and augmentation
    pub seed: u64,

    /// Pretrained backbone record (`.mpk`)
    pub backbone_weights: Option<PathBuf>,

    /// Train from a randomly initialised backbone when no weights are given
    pub random_backbone: bool,

    /// Decode all images into memory before training
    pub cache_images: bool,

    /// Training-stream augmentation
    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Dataset"),
            output_dir: PathBuf::from("output"),
            model_name: "tomato_model".to_string(),
            image_size: crate::IMAGE_SIZE,
            batch_size: 32,
            epochs_phase1: 10,
            epochs_phase2: 5,
            learning_rate_phase1: 1e-3,
            learning_rate_phase2: 1e-4,
            fine_tune_layers: 50,
            validation_split: 0.2,
            hidden_units: 128,
            dropout: 0.5,
            seed: 42,
            backbone_weights: None,
            random_backbone: false,
            cache_images: false,
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.image_size == 0 {
            return Err("image_size must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.epochs_phase1 == 0 || self.epochs_phase2 == 0 {
            return Err("both training phases need at least one epoch".to_string());
        }
        if self.learning_rate_phase1 <= 0.0 || self.learning_rate_phase2 <= 0.0 {
            return Err("learning rates must be positive".to_string());
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err("validation_split must be in range (0.0, 1.0)".to_string());
        }
        if self.hidden_units == 0 {
            return Err("hidden_units must be greater than 0".to_string());
        }
        if self.dropout < 0.0 || self.dropout >= 1.0 {
            return Err("dropout must be in range [0.0, 1.0)".to_string());
        }
        if self.model_name.is_empty() {
            return Err("model_name must not be empty".to_string());
        }
        self.augmentation.validate()
    }

    /// Artifact base path (`<output_dir>/<model_name>`)
    pub fn model_path(&self) -> PathBuf {
        self.output_dir.join(&self.model_name)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| TomatoError::Config(format!("cannot read {:?}: {}", path, e)))?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Evaluation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Dataset root (same layout as for training)
    pub data_dir: PathBuf,

    /// Artifact base path written by training
    pub model_path: PathBuf,

    /// Directory receiving the confusion matrix and report
    pub output_dir: PathBuf,

    /// Batch size for the forward passes
    pub batch_size: usize,

    /// Must match the split used for training
    pub validation_split: f64,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("Dataset"),
            model_path: PathBuf::from("output/tomato_model"),
            output_dir: PathBuf::from("output"),
            batch_size: 32,
            validation_split: 0.2,
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err("validation_split must be in range (0.0, 1.0)".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.image_size, 224);
        assert_eq!(config.batch_size, 32);
        assert_eq!(config.epochs_phase1, 10);
        assert_eq!(config.epochs_phase2, 5);
        assert_eq!(config.fine_tune_layers, 50);
        assert_eq!(config.model_path(), PathBuf::from("output/tomato_model"));
    }

    #[test]
    fn test_invalid_config() {
        let mut config = TrainingConfig::default();
        config.validation_split = 1.0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.epochs_phase2 = 0;
        assert!(config.validate().is_err());

        let mut config = TrainingConfig::default();
        config.dropout = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{"batch_size": 8, "augmentation": {"fill_mode": "reflect"}}"#)
            .unwrap();

        let config = TrainingConfig::load(&path).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.epochs_phase1, 10);
        assert_eq!(config.augmentation.fill_mode, crate::dataset::FillMode::Reflect);
        assert_eq!(config.augmentation.rotation_range, 25.0);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        let mut config = TrainingConfig::default();
        config.seed = 7;
        config.save(&path).unwrap();

        assert_eq!(TrainingConfig::load(&path).unwrap().seed, 7);
    }

    #[test]
    fn test_evaluation_config() {
        let config = EvaluationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model_path, PathBuf::from("output/tomato_model"));
    }
}
