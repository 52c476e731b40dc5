//! Model Artifact
//!
//! A trained model is stored as two files sharing a base path:
//!
//! - `<base>.mpk`: parameters (burn `CompactRecorder`)
//! - `<base>.json`: [`ModelMetadata`], including the ordered label list
//!
//! Loaders rebuild the architecture from the metadata, so the index-to-label
//! mapping always travels with the weights it belongs to.

use std::path::{Path, PathBuf};

use burn::{module::Module, record::CompactRecorder, tensor::backend::Backend};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::classifier::{TomatoClassifier, TomatoClassifierConfig};
use crate::utils::error::{Result, TomatoError};

/// Metadata persisted next to the model parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Class directory names in output index order
    pub class_names: Vec<String>,

    /// Labels returned by the API, index-aligned with `class_names`
    pub labels: Vec<String>,

    /// Square input resolution used for training
    pub image_size: usize,

    /// Hidden units of the classification head
    pub hidden_units: usize,

    /// Dropout of the classification head
    pub dropout: f64,

    /// Epochs of phase 1 (frozen backbone)
    pub epochs_phase1: usize,

    /// Epochs of phase 2 (fine-tuning)
    pub epochs_phase2: usize,

    /// Training time (RFC 3339)
    pub trained_at: String,

    /// Library version that produced the artifact
    pub version: String,
}

impl ModelMetadata {
    pub fn new(
        class_names: Vec<String>,
        labels: Vec<String>,
        image_size: usize,
        hidden_units: usize,
        dropout: f64,
        epochs_phase1: usize,
        epochs_phase2: usize,
    ) -> Self {
        Self {
            class_names,
            labels,
            image_size,
            hidden_units,
            dropout,
            epochs_phase1,
            epochs_phase2,
            trained_at: chrono::Local::now().to_rfc3339(),
            version: crate::VERSION.to_string(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.labels.len()
    }

    /// Architecture configuration matching the stored parameters
    pub fn classifier_config(&self) -> TomatoClassifierConfig {
        TomatoClassifierConfig::new()
            .with_num_classes(self.num_classes())
            .with_hidden_units(self.hidden_units)
            .with_dropout(self.dropout)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.labels.is_empty() {
            return Err(TomatoError::Model("metadata lists no labels".to_string()));
        }
        if self.labels.len() != self.class_names.len() {
            return Err(TomatoError::Model(format!(
                "metadata lists {} labels but {} class names",
                self.labels.len(),
                self.class_names.len()
            )));
        }
        if self.image_size == 0 {
            return Err(TomatoError::Model("metadata image_size is 0".to_string()));
        }
        Ok(())
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_string(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Base path of an artifact, with a trailing `.mpk` or `.json` removed
///
/// Other dots are part of the name (`models/tomato.v2`).
pub fn artifact_base(path: &Path) -> PathBuf {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mpk") | Some("json") => path.with_extension(""),
        _ => path.to_path_buf(),
    }
}

fn with_suffix(path: &Path, extension: &str) -> PathBuf {
    let mut name = artifact_base(path).into_os_string();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Path of the parameter record
pub fn weights_path(path: &Path) -> PathBuf {
    with_suffix(path, "mpk")
}

/// Path of the metadata file
pub fn metadata_path(path: &Path) -> PathBuf {
    with_suffix(path, "json")
}

/// Check whether both artifact files exist
pub fn artifact_exists(path: &Path) -> bool {
    weights_path(path).exists() && metadata_path(path).exists()
}

/// Save a trained model and its metadata
pub fn save_artifact<B: Backend>(
    model: TomatoClassifier<B>,
    metadata: &ModelMetadata,
    path: &Path,
) -> Result<()> {
    metadata.validate()?;
    if model.num_classes() != metadata.num_classes() {
        return Err(TomatoError::Model(format!(
            "model has {} outputs but metadata lists {} labels",
            model.num_classes(),
            metadata.num_classes()
        )));
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    model
        .save_file(weights_path(path), &CompactRecorder::new())
        .map_err(|e| TomatoError::Model(format!("Failed to save model: {}", e)))?;
    std::fs::write(metadata_path(path), metadata.to_json_string()?)?;

    info!("Saved model artifact to {:?}", artifact_base(path));
    Ok(())
}

/// Read only the metadata of an artifact
pub fn load_metadata(path: &Path) -> Result<ModelMetadata> {
    let meta_path = metadata_path(path);
    if !meta_path.exists() {
        return Err(TomatoError::ModelNotFound(meta_path));
    }
    let metadata = ModelMetadata::from_json_string(&std::fs::read_to_string(&meta_path)?)?;
    metadata.validate()?;
    Ok(metadata)
}

/// Load a model artifact
pub fn load_artifact<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(TomatoClassifier<B>, ModelMetadata)> {
    let weights = weights_path(path);
    if !weights.exists() {
        return Err(TomatoError::ModelNotFound(weights));
    }
    let metadata = load_metadata(path)?;

    let model = metadata
        .classifier_config()
        .init::<B>(device)
        .load_file(weights.clone(), &CompactRecorder::new(), device)
        .map_err(|e| TomatoError::Model(format!("Failed to load {:?}: {}", weights, e)))?;

    info!(
        "Loaded model artifact {:?} ({} classes, trained {})",
        artifact_base(path),
        metadata.num_classes(),
        metadata.trained_at
    );

    Ok((model, metadata))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Metadata for a model over the given class directories
    pub fn metadata(class_names: &[&str], image_size: usize) -> ModelMetadata {
        ModelMetadata::new(
            class_names.iter().map(|c| c.to_string()).collect(),
            class_names
                .iter()
                .map(|c| crate::dataset::serving_label(c))
                .collect(),
            image_size,
            16,
            0.5,
            1,
            1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::TOMATO_CLASSES;
    use burn::tensor::{Distribution, Tensor};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_paths() {
        let base = Path::new("output/tomato_model");
        assert_eq!(weights_path(base), PathBuf::from("output/tomato_model.mpk"));
        assert_eq!(
            metadata_path(Path::new("output/tomato_model.mpk")),
            PathBuf::from("output/tomato_model.json")
        );
    }

    #[test]
    fn test_dotted_model_names_keep_their_suffix() {
        let base = Path::new("models/tomato.v2");
        assert_eq!(artifact_base(base), PathBuf::from("models/tomato.v2"));
        assert_eq!(weights_path(base), PathBuf::from("models/tomato.v2.mpk"));
        assert_eq!(metadata_path(base), PathBuf::from("models/tomato.v2.json"));
        assert_eq!(
            weights_path(Path::new("models/tomato.v2.json")),
            PathBuf::from("models/tomato.v2.mpk")
        );
    }

    #[test]
    fn test_dotted_model_name_round_trip() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let metadata = fixtures::metadata(&TOMATO_CLASSES, 32);

        let v1 = dir.path().join("tomato.v1");
        let v2 = dir.path().join("tomato.v2");
        save_artifact(metadata.classifier_config().init::<TestBackend>(&device), &metadata, &v1)
            .unwrap();
        save_artifact(metadata.classifier_config().init::<TestBackend>(&device), &metadata, &v2)
            .unwrap();

        assert!(dir.path().join("tomato.v1.mpk").exists());
        assert!(dir.path().join("tomato.v2.json").exists());
        assert!(!dir.path().join("tomato.mpk").exists());
        assert!(load_artifact::<TestBackend>(&v2, &device).is_ok());
    }

    #[test]
    fn test_metadata_validation() {
        let mut metadata = fixtures::metadata(&TOMATO_CLASSES, 224);
        assert!(metadata.validate().is_ok());
        assert_eq!(metadata.labels[4], "healthy");

        metadata.labels.pop();
        assert!(metadata.validate().is_err());
    }

    #[test]
    fn test_save_and_load_artifact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("tomato_model");
        let device = Default::default();

        let metadata = fixtures::metadata(&TOMATO_CLASSES, 32);
        let model = metadata.classifier_config().init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Default, &device);
        let expected: Vec<f32> = model.forward_softmax(x.clone()).into_data().iter::<f32>().collect();

        save_artifact(model, &metadata, &path).unwrap();
        assert!(artifact_exists(&path));

        let (loaded, loaded_meta) = load_artifact::<TestBackend>(&path, &device).unwrap();
        assert_eq!(loaded_meta, metadata);

        let actual: Vec<f32> = loaded.forward_softmax(x).into_data().iter::<f32>().collect();
        for (a, b) in actual.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_label_count_mismatch_rejected() {
        let dir = TempDir::new().unwrap();
        let device = Default::default();
        let metadata = fixtures::metadata(&TOMATO_CLASSES, 32);
        let model = TomatoClassifierConfig::new()
            .with_num_classes(3)
            .init::<TestBackend>(&device);

        assert!(save_artifact(model, &metadata, &dir.path().join("m")).is_err());
    }

    #[test]
    fn test_missing_artifact() {
        let device = Default::default();
        let result = load_artifact::<TestBackend>(Path::new("/no/such/model"), &device);
        assert!(matches!(result, Err(TomatoError::ModelNotFound(_))));
    }
}
