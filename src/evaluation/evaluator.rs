//! Evaluation Pipeline
//!
//! Reloads a trained model artifact, runs it over the same validation subset
//! used during training and reports loss, accuracy, the classification
//! report, per-class accuracy and the confusion matrix.

use std::path::PathBuf;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, ElementConversion},
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::metrics::{ClassificationReport, ConfusionMatrix};
use crate::dataset::{display_name, LeafBatcher, LeafDataset, LeafImageDataset, ValidationSplit};
use crate::model::{artifact::load_artifact, classifier::TomatoClassifier, config::EvaluationConfig};
use crate::utils::charts::generate_heatmap;
use crate::utils::error::{Result, TomatoError};

/// Targets and arg-max predictions over a dataset, with the mean loss
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatasetPredictions {
    pub targets: Vec<usize>,
    pub predictions: Vec<usize>,
    /// Mean cross-entropy per sample
    pub loss: f64,
}

impl DatasetPredictions {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn accuracy(&self) -> f64 {
        if self.targets.is_empty() {
            return 0.0;
        }
        let correct = self
            .targets
            .iter()
            .zip(&self.predictions)
            .filter(|(t, p)| t == p)
            .count();
        correct as f64 / self.targets.len() as f64
    }

    pub fn confusion_matrix(&self, num_classes: usize) -> ConfusionMatrix {
        ConfusionMatrix::from_predictions(&self.targets, &self.predictions, num_classes)
    }
}

/// Run a model over a dataset in order, without augmentation
///
/// Unreadable images are skipped.
pub fn predict_dataset<B: Backend>(
    model: &TomatoClassifier<B>,
    dataset: &LeafImageDataset,
    batch_size: usize,
    device: &B::Device,
) -> DatasetPredictions {
    let batcher = LeafBatcher::<B>::new(dataset.image_size());
    let loss_fn = CrossEntropyLossConfig::new().init(device);

    let mut result = DatasetPredictions::default();
    let mut loss_sum = 0.0f64;

    let indices: Vec<usize> = (0..dataset.len()).collect();
    for chunk in indices.chunks(batch_size.max(1)) {
        let items = dataset.get_many(chunk);
        if items.is_empty() {
            continue;
        }
        let batch = batcher.batch(items, device);
        let batch_len = batch.targets.dims()[0];

        let logits = model.forward(batch.images);
        let loss = loss_fn.forward(logits.clone(), batch.targets.clone());
        loss_sum += loss.into_scalar().elem::<f64>() * batch_len as f64;

        let predictions = logits.argmax(1).flatten::<1>(0, 1);
        result
            .predictions
            .extend(predictions.into_data().iter::<i64>().map(|p| p as usize));
        result
            .targets
            .extend(batch.targets.into_data().iter::<i64>().map(|t| t as usize));
    }

    if !result.is_empty() {
        result.loss = loss_sum / result.len() as f64;
    }
    result
}

/// Accuracy of a single class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassAccuracy {
    pub name: String,
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
}

impl std::fmt::Display for ClassAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {:.2}% ({}/{})",
            self.name,
            self.accuracy * 100.0,
            self.correct,
            self.total
        )
    }
}

/// Everything an evaluation run measured; saved as `evaluation_report.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub model_path: PathBuf,
    pub num_samples: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub per_class: Vec<ClassAccuracy>,
    pub classification_report: ClassificationReport,
    pub confusion_matrix: ConfusionMatrix,
    pub evaluated_at: String,
}

/// Per-class accuracy lines from a confusion matrix
pub fn class_accuracies(cm: &ConfusionMatrix, names: &[String]) -> Vec<ClassAccuracy> {
    let totals = cm.row_sums();
    cm.per_class_accuracy()
        .into_iter()
        .enumerate()
        .map(|(class, accuracy)| ClassAccuracy {
            name: names.get(class).cloned().unwrap_or_else(|| class.to_string()),
            accuracy,
            correct: cm.get(class, class),
            total: totals[class],
        })
        .collect()
}

/// Run the evaluation pipeline
///
/// On a model load failure the error is printed with a hint to run training
/// and returned to the caller.
pub fn run_evaluation<B: Backend>(
    config: &EvaluationConfig,
    device: &B::Device,
) -> Result<EvaluationReport> {
    config.validate().map_err(TomatoError::Config)?;

    println!("{}", "Dataset Information:".cyan().bold());
    let dataset = LeafDataset::new(&config.data_dir)?;
    dataset.get_stats(config.validation_split).print();
    let split = ValidationSplit::from_dataset(&dataset, config.validation_split)?;
    println!("  Validation images per class:");
    for (name, count) in dataset
        .class_names
        .iter()
        .zip(split.validation_counts(dataset.num_classes()))
    {
        println!("    {:<24} {:>6}", display_name(name), count);
    }

    println!("{}", "Loading model...".cyan());
    let (model, metadata) = match load_artifact::<B>(&config.model_path, device) {
        Ok(loaded) => {
            println!("  {} Model loaded from {:?}", "✓".green(), config.model_path);
            loaded
        }
        Err(e) => {
            println!("  {} Error loading model: {}", "✗".red(), e);
            println!("  Run `tomato_leaf train` first to create the model.");
            return Err(e);
        }
    };

    if metadata.num_classes() != dataset.num_classes() {
        return Err(TomatoError::Dataset(format!(
            "model was trained on {} classes but {:?} has {}",
            metadata.num_classes(),
            config.data_dir,
            dataset.num_classes()
        )));
    }
    if metadata.class_names != dataset.class_names {
        warn!(
            "Class directories {:?} differ from the training classes {:?}",
            dataset.class_names, metadata.class_names
        );
    }

    let val_dataset = LeafImageDataset::new(&split.validation, metadata.image_size);
    info!("Evaluating on {} validation images", val_dataset.len());
    let predictions = predict_dataset(&model, &val_dataset, config.batch_size, device);

    let names: Vec<String> = metadata
        .class_names
        .iter()
        .map(|c| display_name(c).to_string())
        .collect();
    let cm = predictions.confusion_matrix(metadata.num_classes());
    let classification_report = ClassificationReport::from_confusion_matrix(&cm, &names);
    let per_class = class_accuracies(&cm, &names);

    println!();
    println!("{}", "Validation Results:".cyan().bold());
    println!("  Loss:     {:.4}", predictions.loss);
    println!("  Accuracy: {:.2}%", predictions.accuracy() * 100.0);

    println!();
    println!("{}", "Classification Report:".cyan().bold());
    println!("{}", classification_report);
    println!("{}", cm.display(&names));

    println!("{}", "Per-Class Accuracy:".cyan().bold());
    for class in &per_class {
        println!("  {}", class);
    }

    std::fs::create_dir_all(&config.output_dir)?;
    let svg_path = config.output_dir.join("confusion_matrix.svg");
    generate_heatmap(
        "Confusion Matrix",
        "Predicted Label",
        "True Label",
        &names,
        &names,
        &cm.matrix,
        &svg_path,
    )?;
    let csv_path = config.output_dir.join("confusion_matrix.csv");
    cm.save_csv(&csv_path, &names)?;

    let report = EvaluationReport {
        model_path: config.model_path.clone(),
        num_samples: predictions.len(),
        loss: predictions.loss,
        accuracy: predictions.accuracy(),
        per_class,
        classification_report,
        confusion_matrix: cm,
        evaluated_at: chrono::Local::now().to_rfc3339(),
    };
    let report_path = config.output_dir.join("evaluation_report.json");
    std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;

    println!();
    println!("{}", "Files Created:".cyan().bold());
    println!("  {:?} - Confusion matrix", svg_path);
    println!("  {:?} - Confusion matrix counts", csv_path);
    println!("  {:?} - Evaluation report", report_path);

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::fixtures::write_dataset;
    use crate::model::artifact::{fixtures::metadata, save_artifact};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    const CLASSES: [&str; 2] = ["Tomato_Early_blight", "Tomato_healthy"];

    #[test]
    fn test_dataset_predictions_accuracy() {
        let predictions = DatasetPredictions {
            targets: vec![0, 1, 1, 0],
            predictions: vec![0, 1, 0, 0],
            loss: 0.3,
        };
        assert_eq!(predictions.accuracy(), 0.75);
        assert_eq!(predictions.confusion_matrix(2).get(1, 0), 1);
        assert_eq!(DatasetPredictions::default().accuracy(), 0.0);
    }

    #[test]
    fn test_class_accuracy_line() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 0], &[0, 0, 1], 3);
        let names = vec!["Early_blight".to_string(), "Late_blight".to_string(), "healthy".to_string()];
        let lines: Vec<String> = class_accuracies(&cm, &names)
            .iter()
            .map(|c| c.to_string())
            .collect();

        assert_eq!(lines[0], "Early_blight: 66.67% (2/3)");
        assert_eq!(lines[1], "Late_blight: 0.00% (0/0)");
    }

    #[test]
    fn test_predict_dataset_order_and_shape() {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), &CLASSES, 3, 16);
        let loader = LeafDataset::new(dir.path()).unwrap();
        let dataset = LeafImageDataset::new(&loader.samples, 16);

        let device = Default::default();
        let model = metadata(&CLASSES, 16).classifier_config().init::<TestBackend>(&device);
        let predictions = predict_dataset(&model, &dataset, 4, &device);

        assert_eq!(predictions.targets, vec![0, 0, 0, 1, 1, 1]);
        assert_eq!(predictions.predictions.len(), 6);
        assert!(predictions.predictions.iter().all(|&p| p < 2));
        assert!(predictions.loss > 0.0);
    }

    #[test]
    fn test_run_evaluation_writes_reports() {
        let data = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_dataset(data.path(), &CLASSES, 5, 16);

        let device = Default::default();
        let model_path = output.path().join("tomato_model");
        let meta = metadata(&CLASSES, 16);
        let model = meta.classifier_config().init::<TestBackend>(&device);
        save_artifact(model, &meta, &model_path).unwrap();

        let config = EvaluationConfig {
            data_dir: data.path().to_path_buf(),
            model_path,
            output_dir: output.path().to_path_buf(),
            batch_size: 4,
            validation_split: 0.2,
        };
        let report = run_evaluation::<TestBackend>(&config, &device).unwrap();

        assert_eq!(report.num_samples, 2);
        assert_eq!(report.per_class.len(), 2);
        assert_eq!(report.per_class[0].name, "Early_blight");
        assert_eq!(report.confusion_matrix.total(), 2);
        assert!(output.path().join("confusion_matrix.svg").exists());
        assert!(output.path().join("confusion_matrix.csv").exists());
        assert!(output.path().join("evaluation_report.json").exists());
    }

    #[test]
    fn test_missing_model_is_reported() {
        let data = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_dataset(data.path(), &CLASSES, 5, 8);

        let config = EvaluationConfig {
            data_dir: data.path().to_path_buf(),
            model_path: output.path().join("missing"),
            output_dir: output.path().to_path_buf(),
            ..EvaluationConfig::default()
        };
        let result = run_evaluation::<TestBackend>(&config, &Default::default());
        assert!(matches!(result, Err(TomatoError::ModelNotFound(_))));
    }
}
