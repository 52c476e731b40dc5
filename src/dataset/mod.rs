//! Dataset module for tomato leaf image handling
//!
//! This module provides functionality for:
//! - Loading a directory-per-class image dataset from disk
//! - Splitting it into training and validation subsets (80/20 per class)
//! - Data augmentation for training robustness
//! - burn `Dataset`/`Batcher` integration
//!
//! ## Class Ordering
//!
//! Class indices follow the sorted class directory names. The same ordering
//! is persisted with the model artifact so serving never relies on a
//! hand-maintained label list.

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod split;

// Re-export main types for convenience
pub use augmentation::{AugmentationConfig, Augmenter, FillMode};
pub use burn_dataset::{LeafBatch, LeafBatcher, LeafItem, LeafImageDataset};
pub use loader::{DatasetStats, ImageSample, LeafDataset};
pub use split::ValidationSplit;

/// Class directory names of the tomato leaf dataset, in index order
pub const TOMATO_CLASSES: [&str; 5] = [
    "Tomato_Bacterial_spot",
    "Tomato_Early_blight",
    "Tomato_Late_blight",
    "Tomato_Leaf_Mold",
    "Tomato_healthy",
];

/// Image file extensions accepted by the loader (compared case-insensitively)
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Label returned by the API for a class directory name
///
/// `Tomato_Bacterial_spot` becomes `bacterial_spot` and `Tomato_healthy`
/// becomes `healthy`. Names without the prefix are only lower-cased.
pub fn serving_label(class_dir: &str) -> String {
    let stripped = class_dir
        .strip_prefix("Tomato")
        .map(|rest| rest.trim_start_matches('_'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(class_dir);
    stripped.to_lowercase()
}

/// Human-readable name used in reports (`Tomato_Leaf_Mold` -> `Leaf_Mold`)
pub fn display_name(class_dir: &str) -> &str {
    class_dir.strip_prefix("Tomato_").unwrap_or(class_dir)
}

/// Check whether a path has one of the accepted image extensions
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
