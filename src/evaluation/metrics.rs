//! Classification Metrics
//!
//! Confusion matrix and the per-class report printed after evaluation:
//! precision, recall, F1 and support per class, plus overall accuracy and
//! macro / support-weighted averages.
//!
//! Every ratio with an empty denominator is reported as 0.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Confusion matrix for multi-class classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// Number of classes
    pub num_classes: usize,

    /// Counts in row-major order (row = actual, column = predicted)
    pub matrix: Vec<usize>,
}

impl ConfusionMatrix {
    /// Create an empty confusion matrix
    pub fn new(num_classes: usize) -> Self {
        Self {
            num_classes,
            matrix: vec![0; num_classes * num_classes],
        }
    }

    /// Build a matrix from parallel target / prediction sequences
    pub fn from_predictions(targets: &[usize], predictions: &[usize], num_classes: usize) -> Self {
        let mut cm = Self::new(num_classes);
        for (&actual, &predicted) in targets.iter().zip(predictions) {
            cm.add(actual, predicted);
        }
        cm
    }

    /// Count one prediction; out-of-range indices are ignored
    pub fn add(&mut self, actual: usize, predicted: usize) {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted] += 1;
        }
    }

    /// Count at (actual, predicted)
    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        if actual < self.num_classes && predicted < self.num_classes {
            self.matrix[actual * self.num_classes + predicted]
        } else {
            0
        }
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        (0..self.num_classes).map(|i| self.get(i, i)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.correct(), self.total())
    }

    /// Samples per actual class
    pub fn row_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|row| (0..self.num_classes).map(|col| self.get(row, col)).sum())
            .collect()
    }

    /// Predictions per class
    pub fn col_sums(&self) -> Vec<usize> {
        (0..self.num_classes)
            .map(|col| (0..self.num_classes).map(|row| self.get(row, col)).sum())
            .collect()
    }

    /// Diagonal over row sum for each class (0.0 for classes without samples)
    pub fn per_class_accuracy(&self) -> Vec<f64> {
        self.row_sums()
            .iter()
            .enumerate()
            .map(|(class, &total)| ratio(self.get(class, class), total))
            .collect()
    }

    /// Text rendering with abbreviated class names
    pub fn display(&self, class_names: &[String]) -> String {
        let name = |i: usize, width: usize| -> String {
            class_names
                .get(i)
                .map(|n| n.chars().take(width).collect())
                .unwrap_or_else(|| i.to_string())
        };

        let mut output = String::from("Confusion Matrix (rows=actual, cols=predicted):\n\n");
        output.push_str(&" ".repeat(15));
        for col in 0..self.num_classes {
            let _ = write!(output, "{:>8}", name(col, 7));
        }
        output.push('\n');

        for row in 0..self.num_classes {
            let _ = write!(output, "{:>14} ", name(row, 14));
            for col in 0..self.num_classes {
                let count = self.get(row, col);
                if row == col {
                    let _ = write!(output, "  [{:>4}]", count);
                } else if count > 0 {
                    let _ = write!(output, "   {:>4} ", count);
                } else {
                    output.push_str("      . ");
                }
            }
            output.push('\n');
        }
        output
    }

    /// Save as CSV with class names as header and row labels
    pub fn save_csv(&self, path: &Path, class_names: &[String]) -> std::io::Result<()> {
        let label = |i: usize| {
            class_names
                .get(i)
                .map(|n| csv_field(n))
                .unwrap_or_else(|| i.to_string())
        };

        let mut content = String::from("actual\\predicted");
        for col in 0..self.num_classes {
            content.push(',');
            content.push_str(&label(col));
        }
        content.push('\n');

        for row in 0..self.num_classes {
            content.push_str(&label(row));
            for col in 0..self.num_classes {
                let _ = write!(content, ",{}", self.get(row, col));
            }
            content.push('\n');
        }

        std::fs::write(path, content)
    }
}

/// Precision, recall and F1 of one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub name: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of samples whose actual class is this one
    pub support: usize,
}

impl ClassMetrics {
    /// Metrics of `class` read off a confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class: usize, name: &str) -> Self {
        let true_positives = cm.get(class, class);
        let predicted = cm.col_sums().get(class).copied().unwrap_or(0);
        let support = cm.row_sums().get(class).copied().unwrap_or(0);

        let precision = ratio(true_positives, predicted);
        let recall = ratio(true_positives, support);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            name: name.to_string(),
            precision,
            recall,
            f1,
            support,
        }
    }
}

/// Averaged precision / recall / F1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class report over a whole evaluation set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    /// Unweighted mean over all classes
    pub macro_avg: AveragedMetrics,
    /// Mean weighted by class support
    pub weighted_avg: AveragedMetrics,
}

impl ClassificationReport {
    /// Build the report from a confusion matrix and the class display names
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, class_names: &[String]) -> Self {
        let classes: Vec<ClassMetrics> = (0..cm.num_classes)
            .map(|class| {
                let name = class_names
                    .get(class)
                    .cloned()
                    .unwrap_or_else(|| class.to_string());
                ClassMetrics::from_confusion_matrix(cm, class, &name)
            })
            .collect();

        let total_support: usize = classes.iter().map(|c| c.support).sum();
        let n = classes.len().max(1) as f64;

        let macro_avg = AveragedMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / n,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / n,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / n,
            support: total_support,
        };

        let weighted = |value: fn(&ClassMetrics) -> f64| -> f64 {
            if total_support == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| value(c) * c.support as f64)
                .sum::<f64>()
                / total_support as f64
        };
        let weighted_avg = AveragedMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total_support,
        };

        Self {
            accuracy: cm.accuracy(),
            classes,
            macro_avg,
            weighted_avg,
        }
    }

    /// Tabular text rendering
    pub fn display(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .chain(std::iter::once("weighted avg".len()))
            .max()
            .unwrap_or(12);

        let mut output = String::new();
        let _ = writeln!(
            output,
            "{:>width$} {:>10} {:>10} {:>10} {:>10}\n",
            "",
            "precision",
            "recall",
            "f1-score",
            "support",
            width = width
        );
        for class in &self.classes {
            let _ = writeln!(
                output,
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                class.name,
                class.precision,
                class.recall,
                class.f1,
                class.support,
                width = width
            );
        }
        output.push('\n');
        let _ = writeln!(
            output,
            "{:>width$} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.macro_avg.support,
            width = width
        );
        for (label, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            let _ = writeln!(
                output,
                "{:>width$} {:>10.2} {:>10.2} {:>10.2} {:>10}",
                label,
                avg.precision,
                avg.recall,
                avg.f1,
                avg.support,
                width = width
            );
        }
        output
    }
}

impl std::fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
