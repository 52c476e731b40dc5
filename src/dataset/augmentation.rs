//! Data Augmentation Module for Tomato Leaf Classification
//!
//! Random geometric and photometric transformations applied to the training
//! stream only. Validation and inference images are never augmented.
//!
//! # Transformations
//!
//! - Rotation, shift, shear and per-axis zoom, composed into a single inverse
//!   affine map about the image centre and sampled bilinearly
//! - Horizontal flip
//! - Multiplicative brightness jitter
//!
//! Pixels mapped from outside the source image are filled according to
//! [`FillMode`].

use std::fmt;
use std::str::FromStr;

use image::{Rgb, RgbImage};
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// How to fill pixels that map outside the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillMode {
    /// Replicate the nearest edge pixel (aaaa|abcd|dddd)
    #[default]
    Nearest,
    /// Fill with a constant value
    Constant,
    /// Mirror at the border (dcba|abcd|dcba)
    Reflect,
    /// Tile the image (abcd|abcd|abcd)
    Wrap,
}

impl FillMode {
    /// Map a possibly out-of-range coordinate into `0..len`
    ///
    /// Returns `None` when the constant fill value should be used.
    fn resolve(self, coord: i64, len: u32) -> Option<u32> {
        let n = len as i64;
        if n == 0 {
            return None;
        }
        if (0..n).contains(&coord) {
            return Some(coord as u32);
        }

        match self {
            FillMode::Nearest => Some(coord.clamp(0, n - 1) as u32),
            FillMode::Constant => None,
            FillMode::Reflect => {
                let m = coord.rem_euclid(2 * n);
                let reflected = if m < n { m } else { 2 * n - 1 - m };
                Some(reflected as u32)
            }
            FillMode::Wrap => Some(coord.rem_euclid(n) as u32),
        }
    }
}

impl FromStr for FillMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(FillMode::Nearest),
            "constant" => Ok(FillMode::Constant),
            "reflect" => Ok(FillMode::Reflect),
            "wrap" => Ok(FillMode::Wrap),
            other => Err(format!(
                "unknown fill mode '{}' (expected nearest, constant, reflect or wrap)",
                other
            )),
        }
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FillMode::Nearest => "nearest",
            FillMode::Constant => "constant",
            FillMode::Reflect => "reflect",
            FillMode::Wrap => "wrap",
        };
        write!(f, "{}", name)
    }
}

/// Configuration for data augmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Maximum rotation in degrees (applies ±rotation_range)
    pub rotation_range: f32,
    /// Maximum horizontal shift as a fraction of the width
    pub width_shift_range: f32,
    /// Maximum vertical shift as a fraction of the height
    pub height_shift_range: f32,
    /// Maximum shear angle in degrees
    pub shear_range: f32,
    /// Zoom factors are drawn from [1 - zoom_range, 1 + zoom_range] per axis
    pub zoom_range: f32,
    /// Randomly mirror images left-right with probability 0.5
    pub horizontal_flip: bool,
    /// Brightness multiplier range (min, max)
    pub brightness_range: (f32, f32),
    /// Fill mode for pixels mapped outside the image
    pub fill_mode: FillMode,
    /// Fill value used with [`FillMode::Constant`]
    pub cval: u8,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation_range: 25.0,
            width_shift_range: 0.2,
            height_shift_range: 0.2,
            shear_range: 0.2,
            zoom_range: 0.2,
            horizontal_flip: true,
            brightness_range: (0.8, 1.2),
            fill_mode: FillMode::Nearest,
            cval: 0,
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            rotation_range: 0.0,
            width_shift_range: 0.0,
            height_shift_range: 0.0,
            shear_range: 0.0,
            zoom_range: 0.0,
            horizontal_flip: false,
            brightness_range: (1.0, 1.0),
            fill_mode: FillMode::Nearest,
            cval: 0,
        }
    }

    /// Check that all ranges are usable
    pub fn validate(&self) -> Result<(), String> {
        if self.rotation_range < 0.0
            || self.width_shift_range < 0.0
            || self.height_shift_range < 0.0
            || self.shear_range < 0.0
        {
            return Err("augmentation ranges must be non-negative".to_string());
        }
        if !(0.0..1.0).contains(&self.zoom_range) {
            return Err("zoom_range must be in [0, 1)".to_string());
        }
        let (lo, hi) = self.brightness_range;
        if lo <= 0.0 || hi < lo {
            return Err("brightness_range must satisfy 0 < min <= max".to_string());
        }
        Ok(())
    }
}

/// Parameters of one random geometric transformation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineParams {
    /// Rotation in degrees
    pub rotation: f32,
    /// Horizontal shift in pixels
    pub tx: f32,
    /// Vertical shift in pixels
    pub ty: f32,
    /// Shear angle in degrees
    pub shear: f32,
    /// Horizontal zoom factor
    pub zx: f32,
    /// Vertical zoom factor
    pub zy: f32,
}

impl AffineParams {
    /// The identity transformation
    pub fn identity() -> Self {
        Self {
            rotation: 0.0,
            tx: 0.0,
            ty: 0.0,
            shear: 0.0,
            zx: 1.0,
            zy: 1.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    /// 2x2 linear part mapping output offsets to source offsets: R * Sh * Z
    fn linear(&self) -> [[f32; 2]; 2] {
        let (sin_r, cos_r) = self.rotation.to_radians().sin_cos();
        let (sin_s, cos_s) = self.shear.to_radians().sin_cos();

        // R * Sh
        let a = [
            [cos_r, -cos_r * sin_s - sin_r * cos_s],
            [sin_r, -sin_r * sin_s + cos_r * cos_s],
        ];

        // (R * Sh) * Z
        [
            [a[0][0] * self.zx, a[0][1] * self.zy],
            [a[1][0] * self.zx, a[1][1] * self.zy],
        ]
    }
}

/// Image augmenter that applies random transformations
#[derive(Debug, Clone)]
pub struct Augmenter {
    config: AugmentationConfig,
}

impl Augmenter {
    /// Create a new augmenter with the given configuration
    pub fn new(config: AugmentationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Apply the configured random augmentations to an image
    pub fn augment(&self, img: &RgbImage, rng: &mut ChaCha8Rng) -> RgbImage {
        let (width, height) = img.dimensions();
        let params = self.sample_params(rng, width, height);

        let mut result = if params.is_identity() {
            img.clone()
        } else {
            self.apply_affine(img, &params)
        };

        if self.config.horizontal_flip && rng.gen_bool(0.5) {
            image::imageops::flip_horizontal_in_place(&mut result);
        }

        let (lo, hi) = self.config.brightness_range;
        let factor = uniform(rng, lo, hi);
        if (factor - 1.0).abs() > f32::EPSILON {
            adjust_brightness(&mut result, factor);
        }

        result
    }

    /// Draw random transformation parameters for an image of the given size
    pub fn sample_params(&self, rng: &mut ChaCha8Rng, width: u32, height: u32) -> AffineParams {
        let c = &self.config;
        AffineParams {
            rotation: uniform(rng, -c.rotation_range, c.rotation_range),
            tx: uniform(rng, -c.width_shift_range, c.width_shift_range) * width as f32,
            ty: uniform(rng, -c.height_shift_range, c.height_shift_range) * height as f32,
            shear: uniform(rng, -c.shear_range, c.shear_range),
            zx: uniform(rng, 1.0 - c.zoom_range, 1.0 + c.zoom_range),
            zy: uniform(rng, 1.0 - c.zoom_range, 1.0 + c.zoom_range),
        }
    }

    /// Warp an image with `src = M * (dst - centre) + centre + shift`
    pub fn apply_affine(&self, img: &RgbImage, params: &AffineParams) -> RgbImage {
        let (width, height) = img.dimensions();
        let m = params.linear();
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        RgbImage::from_fn(width, height, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;

            let src_x = m[0][0] * dx + m[0][1] * dy + cx + params.tx;
            let src_y = m[1][0] * dx + m[1][1] * dy + cy + params.ty;

            self.bilinear_sample(img, src_x, src_y)
        })
    }

    /// Sample a pixel using bilinear interpolation and the configured fill mode
    fn bilinear_sample(&self, img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
        let (width, height) = img.dimensions();
        let fill = self.config.fill_mode;
        let cval = self.config.cval as f32;

        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let fetch = |px: i64, py: i64, c: usize| -> f32 {
            match (fill.resolve(px, width), fill.resolve(py, height)) {
                (Some(sx), Some(sy)) => img.get_pixel(sx, sy)[c] as f32,
                _ => cval,
            }
        };

        let (x0, y0) = (x0 as i64, y0 as i64);
        let mut result = [0u8; 3];
        for (c, out) in result.iter_mut().enumerate() {
            let v = fetch(x0, y0, c) * (1.0 - fx) * (1.0 - fy)
                + fetch(x0 + 1, y0, c) * fx * (1.0 - fy)
                + fetch(x0, y0 + 1, c) * (1.0 - fx) * fy
                + fetch(x0 + 1, y0 + 1, c) * fx * fy;

            *out = v.round().clamp(0.0, 255.0) as u8;
        }

        Rgb(result)
    }
}

/// Multiply every channel by `factor`, saturating at 255
pub fn adjust_brightness(img: &mut RgbImage, factor: f32) {
    for pixel in img.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            *channel = (*channel as f32 * factor).round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Convert an RGB image to CHW float data normalized to [0, 1]
pub fn to_tensor_data(img: &RgbImage) -> Vec<f32> {
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity(3 * height as usize * width as usize);

    for c in 0..3 {
        for y in 0..height {
            for x in 0..width {
                data.push(img.get_pixel(x, y)[c] as f32 / 255.0);
            }
        }
    }

    data
}

/// Uniform sample from [lo, hi], or `lo` for a degenerate range
fn uniform(rng: &mut ChaCha8Rng, lo: f32, hi: f32) -> f32 {
    if hi > lo {
        rng.gen_range(lo..=hi)
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn create_test_image() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]))
    }

    #[test]
    fn test_default_matches_training_recipe() {
        let config = AugmentationConfig::default();
        assert_eq!(config.rotation_range, 25.0);
        assert_eq!(config.brightness_range, (0.8, 1.2));
        assert_eq!(config.fill_mode, FillMode::Nearest);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_augmentation_is_identity() {
        let aug = Augmenter::new(AugmentationConfig::none());
        let img = create_test_image();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        assert_eq!(aug.augment(&img, &mut rng), img);
    }

    #[test]
    fn test_augment_keeps_dimensions_and_is_seeded() {
        let aug = Augmenter::new(AugmentationConfig::default());
        let img = create_test_image();

        let a = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(42));
        let b = aug.augment(&img, &mut ChaCha8Rng::seed_from_u64(42));

        assert_eq!(a.dimensions(), (64, 64));
        assert_eq!(a, b);
    }

    #[test]
    fn test_sampled_params_within_ranges() {
        let aug = Augmenter::new(AugmentationConfig::default());
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..100 {
            let p = aug.sample_params(&mut rng, 100, 50);
            assert!(p.rotation.abs() <= 25.0);
            assert!(p.tx.abs() <= 20.0);
            assert!(p.ty.abs() <= 10.0);
            assert!(p.shear.abs() <= 0.2);
            assert!((0.8..=1.2).contains(&p.zx));
            assert!((0.8..=1.2).contains(&p.zy));
        }
    }

    #[test]
    fn test_shift_with_nearest_fill() {
        let aug = Augmenter::new(AugmentationConfig::none());
        let img = create_test_image();
        let params = AffineParams {
            tx: 2.0,
            ..AffineParams::identity()
        };

        let shifted = aug.apply_affine(&img, &params);
        assert_eq!(shifted.get_pixel(10, 5), img.get_pixel(12, 5));
        // Beyond the right edge the last column is replicated
        assert_eq!(shifted.get_pixel(63, 5), img.get_pixel(63, 5));
    }

    #[test]
    fn test_shift_with_constant_fill() {
        let aug = Augmenter::new(AugmentationConfig {
            fill_mode: FillMode::Constant,
            cval: 0,
            ..AugmentationConfig::none()
        });
        let img = RgbImage::from_pixel(8, 8, Rgb([200, 200, 200]));
        let params = AffineParams {
            tx: -3.0,
            ..AffineParams::identity()
        };

        let shifted = aug.apply_affine(&img, &params);
        assert_eq!(shifted.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(shifted.get_pixel(7, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_fill_mode_resolve() {
        assert_eq!(FillMode::Nearest.resolve(-3, 4), Some(0));
        assert_eq!(FillMode::Nearest.resolve(9, 4), Some(3));
        assert_eq!(FillMode::Constant.resolve(-1, 4), None);
        assert_eq!(FillMode::Constant.resolve(2, 4), Some(2));
        assert_eq!(FillMode::Reflect.resolve(-1, 4), Some(0));
        assert_eq!(FillMode::Reflect.resolve(4, 4), Some(3));
        assert_eq!(FillMode::Reflect.resolve(5, 4), Some(2));
        assert_eq!(FillMode::Wrap.resolve(-1, 4), Some(3));
        assert_eq!(FillMode::Wrap.resolve(5, 4), Some(1));
    }

    #[test]
    fn test_fill_mode_parse() {
        assert_eq!("Reflect".parse::<FillMode>().unwrap(), FillMode::Reflect);
        assert!("mirror".parse::<FillMode>().is_err());
        assert_eq!(FillMode::Wrap.to_string(), "wrap");
    }

    #[test]
    fn test_brightness_saturates() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([100, 200, 10]));
        adjust_brightness(&mut img, 1.5);
        assert_eq!(img.get_pixel(0, 0), &Rgb([150, 255, 15]));
    }

    #[test]
    fn test_to_tensor_data() {
        let img = create_test_image();
        let data = to_tensor_data(&img);

        // CHW format: 3 * 64 * 64
        assert_eq!(data.len(), 3 * 64 * 64);
        assert!(data.iter().all(|v| (0.0..=1.0).contains(v)));
        // Blue plane is constant 128
        assert!((data[2 * 64 * 64] - 128.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_config() {
        let config = AugmentationConfig {
            brightness_range: (1.2, 0.8),
            ..AugmentationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
