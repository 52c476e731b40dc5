//! Tomato Leaf Dataset Loader
//!
//! This module handles discovering the class directories of the dataset,
//! enumerating image files and producing dataset statistics.

use std::path::{Path, PathBuf};

use colored::Colorize;
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::{display_name, is_image_file, serving_label, TOMATO_CLASSES};
use crate::utils::error::{Result, ResultExt, TomatoError};
use crate::utils::{format_bar, format_number};

/// A single image sample with its label
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageSample {
    /// Path to the image file
    pub path: PathBuf,
    /// Class label index
    pub label: usize,
    /// Class directory name (e.g., "Tomato_Late_blight")
    pub class_name: String,
}

/// Directory-per-class image dataset
///
/// ```text
/// root_dir/
/// ├── Tomato_Bacterial_spot/
/// │   ├── image1.jpg
/// │   └── image2.png
/// ├── Tomato_Early_blight/
/// │   └── ...
/// └── ...
/// ```
#[derive(Debug, Clone)]
pub struct LeafDataset {
    /// Root directory of the dataset
    pub root_dir: PathBuf,
    /// Class directory names; the position is the class index
    pub class_names: Vec<String>,
    /// All samples, class-major, sorted by file name within each class
    pub samples: Vec<ImageSample>,
}

impl LeafDataset {
    /// Scan a dataset directory
    pub fn new<P: AsRef<Path>>(root_dir: P) -> Result<Self> {
        let root_dir = root_dir.as_ref().to_path_buf();
        info!("Loading dataset from: {:?}", root_dir);

        if !root_dir.is_dir() {
            return Err(TomatoError::DatasetNotFound(root_dir));
        }

        // Discover all class directories
        let mut class_names: Vec<String> = Vec::new();
        let entries =
            std::fs::read_dir(&root_dir).with_context(|| format!("cannot list {:?}", root_dir))?;
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    class_names.push(name.to_string());
                }
            }
        }
        class_names.sort();

        if class_names.is_empty() {
            return Err(TomatoError::Dataset(format!(
                "No class directories found in {:?}",
                root_dir
            )));
        }

        info!("Found {} classes", class_names.len());
        warn_on_unexpected_classes(&class_names);

        let mut samples = Vec::new();
        for (label, class_name) in class_names.iter().enumerate() {
            let class_dir = root_dir.join(class_name);

            let mut paths: Vec<PathBuf> = WalkDir::new(&class_dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.into_path())
                .filter(|p| is_image_file(p))
                .collect();
            paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

            debug!("Class '{}' (label {}): {} images", class_name, label, paths.len());

            samples.extend(paths.into_iter().map(|path| ImageSample {
                path,
                label,
                class_name: class_name.clone(),
            }));
        }

        info!("Loaded {} total samples", samples.len());

        Ok(Self {
            root_dir,
            class_names,
            samples,
        })
    }

    /// Get the number of samples in the dataset
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Get the number of classes
    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Labels served by the API, in class index order
    pub fn labels(&self) -> Vec<String> {
        self.class_names.iter().map(|c| serving_label(c)).collect()
    }

    /// Get samples for a specific class, in file order
    pub fn samples_by_class(&self, class_idx: usize) -> Vec<&ImageSample> {
        self.samples
            .iter()
            .filter(|s| s.label == class_idx)
            .collect()
    }

    /// Get statistics about the dataset
    pub fn get_stats(&self, validation_split: f64) -> DatasetStats {
        let mut class_counts = vec![0usize; self.num_classes()];
        for sample in &self.samples {
            class_counts[sample.label] += 1;
        }

        DatasetStats {
            total_samples: self.samples.len(),
            class_names: self.class_names.clone(),
            class_counts,
            validation_split,
        }
    }
}

fn warn_on_unexpected_classes(class_names: &[String]) {
    let expected: Vec<&str> = TOMATO_CLASSES.to_vec();
    let found: Vec<&str> = class_names.iter().map(String::as_str).collect();
    if found != expected {
        warn!(
            "Class directories {:?} differ from the expected tomato classes {:?}",
            found, expected
        );
    }
}

/// Open an image and resize it to a square of `size` pixels
pub fn load_resized(path: &Path, size: u32) -> Result<RgbImage> {
    let img = image::open(path)
        .map_err(|e| TomatoError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    Ok(img.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}

/// Statistics about the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetStats {
    pub total_samples: usize,
    pub class_names: Vec<String>,
    pub class_counts: Vec<usize>,
    pub validation_split: f64,
}

impl DatasetStats {
    /// Approximate training subset size
    pub fn estimated_training(&self) -> usize {
        (self.total_samples as f64 * (1.0 - self.validation_split)) as usize
    }

    /// Approximate validation subset size
    pub fn estimated_validation(&self) -> usize {
        (self.total_samples as f64 * self.validation_split) as usize
    }

    /// Print statistics to console
    pub fn print(&self) {
        println!("\n{}", "Dataset Information:".cyan().bold());
        println!("{}", "=".repeat(60));

        for (idx, (name, &count)) in self.class_names.iter().zip(&self.class_counts).enumerate() {
            let fraction = if self.total_samples > 0 {
                count as f64 / self.total_samples as f64
            } else {
                0.0
            };
            println!(
                "  {:2}. {:20} {:>6} images  {}",
                idx,
                display_name(name),
                format_number(count),
                format_bar(fraction, 30).green()
            );
        }

        println!("{}", "=".repeat(60));
        println!("  {:24} {:>6} images", "TOTAL", format_number(self.total_samples));
        println!(
            "\n  Training set ({:.0}%):   ~{} images",
            (1.0 - self.validation_split) * 100.0,
            format_number(self.estimated_training())
        );
        println!(
            "  Validation set ({:.0}%): ~{} images",
            self.validation_split * 100.0,
            format_number(self.estimated_validation())
        );
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::path::Path;

    use image::{Rgb, RgbImage};

    /// Write `per_class` small PNG files into one directory per class.
    ///
    /// Each class gets its own base colour so a model can tell them apart.
    pub fn write_dataset(root: &Path, classes: &[&str], per_class: usize, size: u32) {
        for (c, class) in classes.iter().enumerate() {
            let dir = root.join(class);
            std::fs::create_dir_all(&dir).unwrap();
            for i in 0..per_class {
                let shade = (c * 200 / classes.len().max(1)) as u8;
                let img = RgbImage::from_fn(size, size, |x, y| {
                    Rgb([shade, ((x + y) as usize * 4 + i) as u8, 255 - shade])
                });
                img.save(dir.join(format!("img_{:03}.png", i))).unwrap();
            }
        }
    }
}
