//! Burn Dataset Integration for tomato leaf images
//!
//! Implements Burn's `Dataset` trait and a `Batcher` producing
//! `[batch, 3, H, W]` tensors with pixel values in [0, 1].
//!
//! Images are resized when loaded; augmentation (training only) is applied
//! by the batcher to the resized image, so cached datasets still get fresh
//! random transformations every epoch.

use std::fmt;
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::RgbImage;
use indicatif::{ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::{info, warn};

use super::augmentation::{to_tensor_data, Augmenter};
use super::loader::{load_resized, ImageSample};
use crate::utils::error::Result;

/// A single resized image with its label
#[derive(Clone)]
pub struct LeafItem {
    /// Resized RGB image (not yet normalized)
    pub image: RgbImage,
    /// Class label index
    pub label: usize,
    /// Image path (for logging)
    pub path: String,
}

impl LeafItem {
    /// Load an image from disk and resize it
    pub fn from_path(path: &PathBuf, label: usize, image_size: usize) -> Result<Self> {
        let image = load_resized(path, image_size as u32)?;
        Ok(Self {
            image,
            label,
            path: path.to_string_lossy().to_string(),
        })
    }
}

impl fmt::Debug for LeafItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafItem")
            .field("label", &self.label)
            .field("path", &self.path)
            .field(
                "image_size",
                &format!("{}x{}", self.image.width(), self.image.height()),
            )
            .finish()
    }
}

/// Image dataset implementing Burn's Dataset trait
///
/// Loads images lazily on demand unless created with [`LeafImageDataset::new_cached`].
#[derive(Clone)]
pub struct LeafImageDataset {
    /// List of (image_path, label) pairs
    samples: Vec<(PathBuf, usize)>,
    /// Target image size
    image_size: usize,
    /// Pre-loaded items, index-aligned with `samples`
    cached_items: Option<Vec<LeafItem>>,
}

impl fmt::Debug for LeafImageDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafImageDataset")
            .field("len", &self.samples.len())
            .field("image_size", &self.image_size)
            .field("cached", &self.cached_items.is_some())
            .finish()
    }
}

impl LeafImageDataset {
    /// Create a lazily loading dataset
    pub fn new(samples: &[ImageSample], image_size: usize) -> Self {
        Self {
            samples: samples.iter().map(|s| (s.path.clone(), s.label)).collect(),
            image_size,
            cached_items: None,
        }
    }

    /// Create a dataset with every image decoded and resized up front
    ///
    /// Loading runs in parallel with rayon. Unreadable images are skipped
    /// with a warning.
    pub fn new_cached(samples: &[ImageSample], image_size: usize) -> Self {
        let total = samples.len();
        info!("Pre-loading {} images into memory", total);

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }

        let loaded = AtomicUsize::new(0);

        let cached_items: Vec<LeafItem> = samples
            .par_iter()
            .filter_map(|sample| {
                let result = match LeafItem::from_path(&sample.path, sample.label, image_size) {
                    Ok(item) => Some(item),
                    Err(e) => {
                        warn!("Skipping unreadable image: {}", e);
                        None
                    }
                };
                let count = loaded.fetch_add(1, Ordering::Relaxed);
                if count % 100 == 0 {
                    pb.set_position(count as u64);
                }
                result
            })
            .collect();

        pb.finish_and_clear();
        info!("Loaded {} of {} images", cached_items.len(), total);

        // Keep samples aligned with what actually loaded
        let samples = cached_items
            .iter()
            .map(|item| (PathBuf::from(&item.path), item.label))
            .collect();

        Self {
            samples,
            image_size,
            cached_items: Some(cached_items),
        }
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Label of the sample at `index` without loading the image
    pub fn label(&self, index: usize) -> Option<usize> {
        self.samples.get(index).map(|(_, label)| *label)
    }

    /// Load several items in parallel, skipping unreadable images
    pub fn get_many(&self, indices: &[usize]) -> Vec<LeafItem> {
        indices.par_iter().filter_map(|&i| self.get(i)).collect()
    }
}

impl Dataset<LeafItem> for LeafImageDataset {
    fn get(&self, index: usize) -> Option<LeafItem> {
        if let Some(ref cached) = self.cached_items {
            return cached.get(index).cloned();
        }

        let (path, label) = self.samples.get(index)?;
        match LeafItem::from_path(path, *label, self.image_size) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!("Skipping unreadable image: {}", e);
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// A batch of leaf images
#[derive(Clone, Debug)]
pub struct LeafBatch<B: Backend> {
    /// Batch of images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Batch of labels with shape [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher turning [`LeafItem`]s into tensors, optionally augmenting them
pub struct LeafBatcher<B: Backend> {
    image_size: usize,
    augmenter: Option<Augmenter>,
    seed: u64,
    /// Batches produced so far; mixed into the per-batch RNG seed
    batches: AtomicU64,
    _backend: PhantomData<B>,
}

impl<B: Backend> LeafBatcher<B> {
    /// Batcher without augmentation (validation/evaluation)
    pub fn new(image_size: usize) -> Self {
        Self {
            image_size,
            augmenter: None,
            seed: 0,
            batches: AtomicU64::new(0),
            _backend: PhantomData,
        }
    }

    /// Batcher applying random augmentation (training)
    pub fn augmenting(image_size: usize, augmenter: Augmenter, seed: u64) -> Self {
        Self {
            image_size,
            augmenter: Some(augmenter),
            seed,
            batches: AtomicU64::new(0),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> Clone for LeafBatcher<B> {
    fn clone(&self) -> Self {
        Self {
            image_size: self.image_size,
            augmenter: self.augmenter.clone(),
            seed: self.seed,
            batches: AtomicU64::new(self.batches.load(Ordering::Relaxed)),
            _backend: PhantomData,
        }
    }
}

impl<B: Backend> fmt::Debug for LeafBatcher<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafBatcher")
            .field("image_size", &self.image_size)
            .field("augmenting", &self.augmenter.is_some())
            .finish()
    }
}

impl<B: Backend> Batcher<B, LeafItem, LeafBatch<B>> for LeafBatcher<B> {
    fn batch(&self, items: Vec<LeafItem>, device: &B::Device) -> LeafBatch<B> {
        let batch_size = items.len();
        let channels = 3;
        let height = self.image_size;
        let width = self.image_size;

        let mut images_data = Vec::with_capacity(batch_size * channels * height * width);
        let mut targets_data = Vec::with_capacity(batch_size);

        match &self.augmenter {
            Some(augmenter) => {
                let batch_index = self.batches.fetch_add(1, Ordering::Relaxed);
                let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ batch_index.wrapping_mul(0x9E37_79B9));
                for item in &items {
                    let augmented = augmenter.augment(&item.image, &mut rng);
                    images_data.extend(to_tensor_data(&augmented));
                    targets_data.push(item.label as i64);
                }
            }
            None => {
                for item in &items {
                    images_data.extend(to_tensor_data(&item.image));
                    targets_data.push(item.label as i64);
                }
            }
        }

        // Create image tensor with shape [batch_size, channels, height, width]
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, channels, height, width]),
            device,
        );

        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        LeafBatch { images, targets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::augmentation::AugmentationConfig;
    use crate::dataset::loader::{fixtures::write_dataset, LeafDataset};
    use burn_ndarray::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn fixture() -> (TempDir, LeafDataset) {
        let dir = TempDir::new().unwrap();
        write_dataset(dir.path(), &["Tomato_Leaf_Mold", "Tomato_healthy"], 3, 12);
        let dataset = LeafDataset::new(dir.path()).unwrap();
        (dir, dataset)
    }

    #[test]
    fn test_lazy_dataset_resizes() {
        let (_dir, loader) = fixture();
        let dataset = LeafImageDataset::new(&loader.samples, 8);

        assert_eq!(dataset.len(), 6);
        let item = dataset.get(4).unwrap();
        assert_eq!(item.label, 1);
        assert_eq!(item.image.dimensions(), (8, 8));
        assert!(dataset.get(6).is_none());
    }

    #[test]
    fn test_cached_dataset_skips_unreadable() {
        let (dir, _) = fixture();
        std::fs::write(dir.path().join("Tomato_healthy").join("broken.png"), b"nope").unwrap();
        let loader = LeafDataset::new(dir.path()).unwrap();
        assert_eq!(loader.len(), 7);

        let dataset = LeafImageDataset::new_cached(&loader.samples, 8);
        assert_eq!(dataset.len(), 6);
        assert_eq!(dataset.get_many(&[0, 5]).len(), 2);
    }

    #[test]
    fn test_batch_shape_and_range() {
        let (_dir, loader) = fixture();
        let dataset = LeafImageDataset::new(&loader.samples, 8);
        let device = Default::default();
        let batcher = LeafBatcher::<TestBackend>::new(8);

        let batch = batcher.batch(dataset.get_many(&[0, 1, 3]), &device);
        assert_eq!(batch.images.dims(), [3, 3, 8, 8]);
        assert_eq!(batch.targets.dims(), [3]);

        let values: Vec<f32> = batch.images.into_data().iter::<f32>().collect();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));

        let targets: Vec<i64> = batch.targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![0, 0, 1]);
    }

    #[test]
    fn test_augmenting_batcher_varies_between_batches() {
        let (_dir, loader) = fixture();
        let dataset = LeafImageDataset::new(&loader.samples, 12);
        let device = Default::default();
        let batcher = LeafBatcher::<TestBackend>::augmenting(
            12,
            Augmenter::new(AugmentationConfig::default()),
            42,
        );

        let first: Vec<f32> = batcher
            .batch(dataset.get_many(&[0]), &device)
            .images
            .into_data()
            .iter::<f32>()
            .collect();
        let second: Vec<f32> = batcher
            .batch(dataset.get_many(&[0]), &device)
            .images
            .into_data()
            .iter::<f32>()
            .collect();

        assert_eq!(first.len(), second.len());
        assert!(first.iter().all(|v| (0.0..=1.0).contains(v)));
        assert_ne!(first, second);
    }
}
