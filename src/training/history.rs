//! Training History
//!
//! Per-epoch metrics accumulated across both training phases, persisted as
//! `training_history.json` with four equally long sequences (`accuracy`,
//! `val_accuracy`, `loss`, `val_loss`) and plotted as accuracy/loss curves.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::utils::charts::{
    generate_line_panels, DataSeries, LinePanel, VerticalMarker, COLOR_PRIMARY, COLOR_SECONDARY,
};
use crate::utils::error::{Result, TomatoError};

/// Metrics of a single epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochMetrics {
    /// Mean training loss
    pub loss: f64,
    /// Training accuracy (0.0 - 1.0)
    pub accuracy: f64,
    /// Mean validation loss
    pub val_loss: f64,
    /// Validation accuracy (0.0 - 1.0)
    pub val_accuracy: f64,
}

/// Epoch-ordered training history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub accuracy: Vec<f64>,
    pub val_accuracy: Vec<f64>,
    pub loss: Vec<f64>,
    pub val_loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the metrics of one epoch
    pub fn record(&mut self, metrics: EpochMetrics) {
        self.accuracy.push(metrics.accuracy);
        self.val_accuracy.push(metrics.val_accuracy);
        self.loss.push(metrics.loss);
        self.val_loss.push(metrics.val_loss);
    }

    /// Append another phase's history after this one
    pub fn extend(&mut self, other: &TrainingHistory) {
        self.accuracy.extend_from_slice(&other.accuracy);
        self.val_accuracy.extend_from_slice(&other.val_accuracy);
        self.loss.extend_from_slice(&other.loss);
        self.val_loss.extend_from_slice(&other.val_loss);
    }

    /// Number of recorded epochs
    pub fn len(&self) -> usize {
        self.loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_empty()
    }

    /// Metrics of the last recorded epoch
    pub fn last(&self) -> Option<EpochMetrics> {
        Some(EpochMetrics {
            loss: *self.loss.last()?,
            accuracy: *self.accuracy.last()?,
            val_loss: *self.val_loss.last()?,
            val_accuracy: *self.val_accuracy.last()?,
        })
    }

    /// Check that all four sequences have the same length
    pub fn is_consistent(&self) -> bool {
        let n = self.loss.len();
        self.accuracy.len() == n && self.val_accuracy.len() == n && self.val_loss.len() == n
    }

    /// Save as pretty-printed JSON
    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Load from JSON
    pub fn load_json(path: &Path) -> Result<Self> {
        let history: Self = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        if !history.is_consistent() {
            return Err(TomatoError::Serialization(format!(
                "{:?}: history sequences have different lengths",
                path
            )));
        }
        Ok(history)
    }

    /// Plot accuracy and loss curves side by side
    ///
    /// `fine_tune_marker` is the epoch index where the dashed
    /// "Fine-tuning starts" line is drawn.
    pub fn plot(&self, path: &Path, fine_tune_marker: Option<usize>) -> Result<()> {
        let marker = fine_tune_marker.map(|epoch| VerticalMarker {
            x: epoch as f64,
            label: "Fine-tuning starts".to_string(),
        });

        let panels = [
            LinePanel {
                title: "Model Accuracy".to_string(),
                x_label: "Epoch".to_string(),
                y_label: "Accuracy".to_string(),
                series: vec![
                    DataSeries::from_values("Training Accuracy", &self.accuracy, COLOR_PRIMARY),
                    DataSeries::from_values("Validation Accuracy", &self.val_accuracy, COLOR_SECONDARY),
                ],
                marker: marker.clone(),
            },
            LinePanel {
                title: "Model Loss".to_string(),
                x_label: "Epoch".to_string(),
                y_label: "Loss".to_string(),
                series: vec![
                    DataSeries::from_values("Training Loss", &self.loss, COLOR_PRIMARY),
                    DataSeries::from_values("Validation Loss", &self.val_loss, COLOR_SECONDARY),
                ],
                marker,
            },
        ];

        generate_line_panels(&panels, path)?;
        Ok(())
    }
}
