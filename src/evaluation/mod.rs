//! Evaluation module
//!
//! Confusion matrix, classification report and the evaluation pipeline that
//! reloads a trained artifact and scores it on the validation subset.

pub mod evaluator;
pub mod metrics;

pub use evaluator::{predict_dataset, run_evaluation, DatasetPredictions, EvaluationReport};
pub use metrics::{ClassificationReport, ConfusionMatrix};
