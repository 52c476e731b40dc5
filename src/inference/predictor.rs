//! Inference Predictor Module
//!
//! The [`Classifier`] trait is the seam between request handling and the
//! model: the server holds a `dyn Classifier`, so tests substitute a fixed
//! model. [`BurnClassifier`] is the real implementation, loading a trained
//! artifact once and reading its label order from the artifact metadata.

use std::path::Path;
use std::sync::Mutex;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::preprocess::{prepare_image_with_size, ImageTensor};
use crate::model::artifact::{load_artifact, ModelMetadata};
use crate::model::classifier::TomatoClassifier;
use crate::utils::error::{Result, TomatoError};

/// Result of a single prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Label of the arg-max class
    pub label: String,

    /// Probability of the arg-max class
    pub confidence: f32,

    /// Index of the arg-max class
    pub class_index: usize,

    /// Full probability vector, in class index order
    pub probabilities: Vec<f32>,
}

impl Prediction {
    /// `(label, probability)` pairs sorted by descending probability
    pub fn ranked<'a>(&'a self, labels: &'a [String]) -> Vec<(&'a str, f32)> {
        let mut ranked: Vec<(&str, f32)> = labels
            .iter()
            .map(String::as_str)
            .zip(self.probabilities.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }
}

/// Map a probability vector to its arg-max label
///
/// Ties resolve to the lowest index.
pub fn decode_prediction(probabilities: &[f32], labels: &[String]) -> Result<Prediction> {
    if probabilities.is_empty() {
        return Err(TomatoError::Inference("model returned no outputs".to_string()));
    }
    if probabilities.len() != labels.len() {
        return Err(TomatoError::Inference(format!(
            "model returned {} outputs for {} labels",
            probabilities.len(),
            labels.len()
        )));
    }
    if probabilities.iter().any(|p| !p.is_finite()) {
        return Err(TomatoError::Inference("model returned non-finite output".to_string()));
    }

    let mut class_index = 0;
    for (i, &p) in probabilities.iter().enumerate() {
        if p > probabilities[class_index] {
            class_index = i;
        }
    }

    Ok(Prediction {
        label: labels[class_index].clone(),
        confidence: probabilities[class_index],
        class_index,
        probabilities: probabilities.to_vec(),
    })
}

/// An image classifier usable as a shared service object
pub trait Classifier: Send + Sync {
    /// Labels in output index order
    fn labels(&self) -> &[String];

    /// Square input resolution
    fn image_size(&self) -> usize {
        crate::IMAGE_SIZE
    }

    /// Classify a preprocessed image
    fn predict(&self, image: &ImageTensor) -> Result<Prediction>;

    /// Decode, preprocess and classify encoded image bytes
    fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let image = prepare_image_with_size(bytes, self.image_size())?;
        self.predict(&image)
    }
}

/// Classifier backed by a trained burn model
///
/// Forward passes are serialised through a mutex.
pub struct BurnClassifier<B: Backend> {
    model: Mutex<TomatoClassifier<B>>,
    metadata: ModelMetadata,
    device: B::Device,
}

impl<B: Backend> BurnClassifier<B> {
    /// Load a model artifact (`<path>.mpk` + `<path>.json`)
    pub fn load<P: AsRef<Path>>(path: P, device: B::Device) -> Result<Self> {
        let (model, metadata) = load_artifact::<B>(path.as_ref(), &device)?;
        Ok(Self::new(model, metadata, device))
    }

    pub fn new(model: TomatoClassifier<B>, metadata: ModelMetadata, device: B::Device) -> Self {
        Self {
            model: Mutex::new(model),
            metadata,
            device,
        }
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }
}

impl<B: Backend> Classifier for BurnClassifier<B> {
    fn labels(&self) -> &[String] {
        &self.metadata.labels
    }

    fn image_size(&self) -> usize {
        self.metadata.image_size
    }

    fn predict(&self, image: &ImageTensor) -> Result<Prediction> {
        if image.size() != self.metadata.image_size {
            return Err(TomatoError::InvalidInput(format!(
                "image is {}x{} but the model expects {}x{}",
                image.size(),
                image.size(),
                self.metadata.image_size,
                self.metadata.image_size
            )));
        }

        let input = image.to_tensor::<B>(&self.device);
        let probabilities: Vec<f32> = {
            // Forward passes never mutate the model, so a poisoned lock is still usable
            let model = self.model.lock().unwrap_or_else(|e| e.into_inner());
            model.forward_softmax(input).into_data().iter::<f32>().collect()
        };

        let prediction = decode_prediction(&probabilities, self.labels())?;
        debug!(
            "Predicted {} ({:.4})",
            prediction.label, prediction.confidence
        );
        Ok(prediction)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Classifier returning the same probability vector for every image
    pub struct FixedClassifier {
        pub labels: Vec<String>,
        pub probabilities: Vec<f32>,
    }

    impl FixedClassifier {
        /// One-hot output for `index` over the five tomato labels
        pub fn one_hot(index: usize) -> Self {
            let labels: Vec<String> = crate::dataset::TOMATO_CLASSES
                .iter()
                .map(|c| crate::dataset::serving_label(c))
                .collect();
            let mut probabilities = vec![0.0; labels.len()];
            probabilities[index] = 1.0;
            Self {
                labels,
                probabilities,
            }
        }
    }

    impl Classifier for FixedClassifier {
        fn labels(&self) -> &[String] {
            &self.labels
        }

        fn predict(&self, _image: &ImageTensor) -> Result<Prediction> {
            decode_prediction(&self.probabilities, &self.labels)
        }
    }
}
