//! Image preprocessing for inference
//!
//! Decodes arbitrary image bytes, forces RGB, resizes to the model input
//! size and scales pixels to [0, 1]. The result is kept in NHWC layout with
//! a leading batch dimension of 1, `(1, size, size, 3)`; [`ImageTensor::to_tensor`]
//! converts it to the NCHW tensor the model consumes.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, DynamicImage};

use crate::utils::error::{Result, TomatoError};

/// A single preprocessed image, NHWC with batch size 1
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    size: usize,
}

impl ImageTensor {
    /// Resize and rescale a decoded image
    pub fn from_image(image: &DynamicImage, size: usize) -> Self {
        let rgb = image
            .resize_exact(size as u32, size as u32, FilterType::Triangle)
            .to_rgb8();
        let data = rgb
            .pixels()
            .flat_map(|p| p.0)
            .map(|v| v as f32 / 255.0)
            .collect();
        Self { data, size }
    }

    /// `[1, height, width, channels]`
    pub fn shape(&self) -> [usize; 4] {
        [1, self.size, self.size, 3]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Values in NHWC order
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Values reordered to CHW
    pub fn to_chw(&self) -> Vec<f32> {
        let pixels = self.size * self.size;
        let mut chw = vec![0.0f32; 3 * pixels];
        for (i, pixel) in self.data.chunks_exact(3).enumerate() {
            chw[i] = pixel[0];
            chw[pixels + i] = pixel[1];
            chw[2 * pixels + i] = pixel[2];
        }
        chw
    }

    /// `[1, 3, size, size]` tensor for the model
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_floats(
            TensorData::new(self.to_chw(), [1, 3, self.size, self.size]),
            device,
        )
    }
}

/// Preprocess encoded image bytes at the default 224×224 resolution
pub fn prepare_image(bytes: &[u8]) -> Result<ImageTensor> {
    prepare_image_with_size(bytes, crate::IMAGE_SIZE)
}

/// Preprocess encoded image bytes at a given square resolution
pub fn prepare_image_with_size(bytes: &[u8], size: usize) -> Result<ImageTensor> {
    if bytes.is_empty() {
        return Err(TomatoError::ImageDecode("empty image data".to_string()));
    }
    let image = image::load_from_memory(bytes)?;
    Ok(ImageTensor::from_image(&image, size))
}

/// Preprocess an image file
pub fn prepare_file(path: &Path, size: usize) -> Result<ImageTensor> {
    let image =
        image::open(path).map_err(|e| TomatoError::ImageLoad(path.to_path_buf(), e.to_string()))?;
    Ok(ImageTensor::from_image(&image, size))
}


#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    #[test]
    fn test_solid_pixel_resized_to_input_shape() {
        let bytes = fixtures::png_bytes(1, 1, [200, 30, 255]);
        let tensor = prepare_image(&bytes).unwrap();

        assert_eq!(tensor.shape(), [1, 224, 224, 3]);
        assert_eq!(tensor.data().len(), 224 * 224 * 3);
        assert!(tensor.data().iter().all(|v| (0.0..=1.0).contains(v)));

        let first = &tensor.data()[..3];
        assert!((first[0] - 200.0 / 255.0).abs() < 1e-6);
        assert!((first[1] - 30.0 / 255.0).abs() < 1e-6);
        assert_eq!(first[2], 1.0);
    }

    #[test]
    fn test_grayscale_forced_to_rgb() {
        let img = GrayImage::from_pixel(5, 3, Luma([128]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();

        let tensor = prepare_image_with_size(bytes.get_ref(), 8).unwrap();
        assert_eq!(tensor.shape(), [1, 8, 8, 3]);
        let v = 128.0 / 255.0;
        assert!(tensor.data().iter().all(|x| (x - v).abs() < 1e-6));
    }

    #[test]
    fn test_chw_layout() {
        let bytes = fixtures::png_bytes(2, 2, [255, 0, 51]);
        let tensor = prepare_image_with_size(&bytes, 2).unwrap();
        let chw = tensor.to_chw();

        assert_eq!(&chw[0..4], &[1.0; 4]);
        assert_eq!(&chw[4..8], &[0.0; 4]);
        assert!(chw[8..12].iter().all(|v| (v - 0.2).abs() < 1e-6));

        let device = Default::default();
        assert_eq!(tensor.to_tensor::<NdArray>(&device).dims(), [1, 3, 2, 2]);
    }

    #[test]
    fn test_corrupt_bytes_rejected() {
        assert!(matches!(
            prepare_image(b"not an image at all"),
            Err(TomatoError::ImageDecode(_))
        ));
        assert!(prepare_image(&[]).is_err());
    }
}
