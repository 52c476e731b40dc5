//! Training/validation split
//!
//! Each class directory is split independently: after sorting its files by
//! name, the first `floor(fraction * n)` files form the validation subset and
//! the remainder the training subset. The split never depends on a random
//! seed, so training and evaluation always see the same validation images.
//!
//! Validation order is class-major and never shuffled. Training order is
//! reshuffled every epoch with a seeded RNG.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use super::loader::{ImageSample, LeafDataset};
use crate::utils::error::{Result, TomatoError};

/// Training and validation subsets of a dataset
#[derive(Debug, Clone)]
pub struct ValidationSplit {
    /// Training samples (class-major until shuffled per epoch)
    pub training: Vec<ImageSample>,
    /// Validation samples, class-major
    pub validation: Vec<ImageSample>,
    /// Fraction held out for validation
    pub fraction: f64,
}

impl ValidationSplit {
    /// Split a dataset, holding out `fraction` of each class for validation
    pub fn from_dataset(dataset: &LeafDataset, fraction: f64) -> Result<Self> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(TomatoError::Config(format!(
                "Validation split must be between 0 and 1 (exclusive), got {}",
                fraction
            )));
        }

        let mut training = Vec::new();
        let mut validation = Vec::new();

        for class_idx in 0..dataset.num_classes() {
            let samples = dataset.samples_by_class(class_idx);
            let n_val = validation_count(samples.len(), fraction);

            validation.extend(samples[..n_val].iter().map(|s| (*s).clone()));
            training.extend(samples[n_val..].iter().map(|s| (*s).clone()));
        }

        if training.is_empty() {
            return Err(TomatoError::Dataset(
                "Training subset is empty; add more images per class".to_string(),
            ));
        }
        if validation.is_empty() {
            return Err(TomatoError::Dataset(format!(
                "Validation subset is empty; each class needs at least {} images",
                (1.0 / fraction).ceil() as usize
            )));
        }

        info!(
            "Split {} images: {} training, {} validation",
            dataset.len(),
            training.len(),
            validation.len()
        );

        Ok(Self {
            training,
            validation,
            fraction,
        })
    }

    /// Number of validation samples per class
    pub fn validation_counts(&self, num_classes: usize) -> Vec<usize> {
        let mut counts = vec![0usize; num_classes];
        for sample in &self.validation {
            if let Some(count) = counts.get_mut(sample.label) {
                *count += 1;
            }
        }
        counts
    }
}

/// Permutation of `0..len` for one epoch, deterministic in `(seed, epoch)`
pub fn shuffled_indices(len: usize, seed: u64, epoch: usize) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(epoch as u64));
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut rng);
    indices
}

/// Validation images taken from a class of `n` images
pub fn validation_count(n: usize, fraction: f64) -> usize {
    (n as f64 * fraction).floor() as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::loader::fixtures::write_dataset;
    use tempfile::TempDir;

    fn dataset(per_class: usize) -> (TempDir, LeafDataset) {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), &["Tomato_Early_blight", "Tomato_healthy"], per_class, 4);
        let dataset = LeafDataset::new(dir.path()).unwrap();
        (dir, dataset)
    }

    #[test]
    fn test_validation_count_floors() {
        assert_eq!(validation_count(10, 0.2), 2);
        assert_eq!(validation_count(14, 0.2), 2);
        assert_eq!(validation_count(4, 0.2), 0);
    }

    #[test]
    fn test_split_takes_first_files_per_class() {
        let (_dir, dataset) = dataset(10);
        let split = ValidationSplit::from_dataset(&dataset, 0.2).unwrap();

        assert_eq!(split.validation.len(), 4);
        assert_eq!(split.training.len(), 16);

        let val_names: Vec<_> = split
            .validation
            .iter()
            .map(|s| (s.label, s.path.file_name().unwrap().to_string_lossy().to_string()))
            .collect();
        assert_eq!(
            val_names,
            vec![
                (0, "img_000.png".to_string()),
                (0, "img_001.png".to_string()),
                (1, "img_000.png".to_string()),
                (1, "img_001.png".to_string()),
            ]
        );
        assert_eq!(split.validation_counts(2), vec![2, 2]);
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let (_dir, dataset) = dataset(7);
        let split = ValidationSplit::from_dataset(&dataset, 0.2).unwrap();

        let mut all: Vec<_> = split
            .training
            .iter()
            .chain(split.validation.iter())
            .map(|s| s.path.clone())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), dataset.len());
    }

    #[test]
    fn test_invalid_fraction() {
        let (_dir, dataset) = dataset(10);
        assert!(ValidationSplit::from_dataset(&dataset, 0.0).is_err());
        assert!(ValidationSplit::from_dataset(&dataset, 1.0).is_err());
    }

    #[test]
    fn test_too_few_images_for_validation() {
        let (_dir, dataset) = dataset(3);
        let err = ValidationSplit::from_dataset(&dataset, 0.2).unwrap_err();
        assert!(matches!(err, TomatoError::Dataset(_)));
    }

    #[test]
    fn test_shuffled_indices_is_a_seeded_permutation() {
        let first = shuffled_indices(16, 42, 0);
        assert_eq!(first, shuffled_indices(16, 42, 0));
        assert_ne!(first, shuffled_indices(16, 42, 1));

        let mut sorted = first.clone();
        sorted.sort();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }
}
