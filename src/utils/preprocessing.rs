//! Letterbox preprocessing for segmentation models and the inverse mask mapping

use crate::{
    error::{BgStudioError, Result},
    models::PreprocessingConfig,
    types::SegmentationMask,
};
use image::{DynamicImage, ImageBuffer, RgbImage};
use ndarray::Array4;

/// Placement of the resized image inside the square model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxGeometry {
    pub target_size: u32,
    pub scale: f32,
    pub scaled_width: u32,
    pub scaled_height: u32,
    pub offset_x: u32,
    pub offset_y: u32,
}

impl LetterboxGeometry {
    /// Aspect-preserving fit of `(width, height)` into a `target_size` square
    ///
    /// # Errors
    /// - Zero-sized input or target
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fit(original_dimensions: (u32, u32), target_size: u32) -> Result<Self> {
        let (orig_width, orig_height) = original_dimensions;
        if orig_width == 0 || orig_height == 0 || target_size == 0 {
            return Err(BgStudioError::segmentation(format!(
                "Cannot letterbox {}x{} into {}x{}",
                orig_width, orig_height, target_size, target_size
            )));
        }

        let target = target_size as f32;
        let scale = (target / orig_width as f32).min(target / orig_height as f32);

        let scaled_width = ((orig_width as f32 * scale).round() as u32).clamp(1, target_size);
        let scaled_height = ((orig_height as f32 * scale).round() as u32).clamp(1, target_size);

        Ok(Self {
            target_size,
            scale,
            scaled_width,
            scaled_height,
            offset_x: (target_size - scaled_width) / 2,
            offset_y: (target_size - scaled_height) / 2,
        })
    }

    /// Canvas coordinate for an original-image pixel
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn to_canvas(&self, x: u32, y: u32) -> (usize, usize) {
        let canvas_x = ((x as f32 * self.scale) as u32 + self.offset_x).min(self.target_size - 1);
        let canvas_y = ((y as f32 * self.scale) as u32 + self.offset_y).min(self.target_size - 1);
        (canvas_x as usize, canvas_y as usize)
    }
}

/// Image preparation for model inference
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// RGB conversion, aspect-preserving resize, white center padding and NCHW normalization
    ///
    /// # Errors
    /// - Degenerate image or target dimensions
    pub fn preprocess_for_inference(
        image: &DynamicImage,
        preprocessing_config: &PreprocessingConfig,
    ) -> Result<(Array4<f32>, LetterboxGeometry)> {
        let rgb_image = image.to_rgb8();
        let geometry =
            LetterboxGeometry::fit(rgb_image.dimensions(), preprocessing_config.target_size[0])?;

        let resized = image::imageops::resize(
            &rgb_image,
            geometry.scaled_width,
            geometry.scaled_height,
            image::imageops::FilterType::Triangle,
        );

        let mut canvas = ImageBuffer::from_pixel(
            geometry.target_size,
            geometry.target_size,
            image::Rgb([255, 255, 255]),
        );
        image::imageops::replace(
            &mut canvas,
            &resized,
            i64::from(geometry.offset_x),
            i64::from(geometry.offset_y),
        );

        Ok((Self::canvas_to_tensor(&canvas, preprocessing_config), geometry))
    }

    // Tensor is allocated with the canvas dimensions
    #[allow(clippy::indexing_slicing)]
    fn canvas_to_tensor(canvas: &RgbImage, config: &PreprocessingConfig) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in canvas.enumerate_pixels() {
            for channel in 0..3 {
                let value = (f32::from(pixel[channel]) / 255.0
                    - config.normalization_mean[channel])
                    / config.normalization_std[channel];
                tensor[[0, channel, y as usize, x as usize]] = value;
            }
        }

        tensor
    }

    /// Map a `[1, 1, S, S]` model output back onto the original image extents
    ///
    /// # Errors
    /// - Output tensor shape does not match the letterbox canvas
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn tensor_to_mask(
        tensor: &Array4<f32>,
        geometry: &LetterboxGeometry,
        original_dimensions: (u32, u32),
    ) -> Result<SegmentationMask> {
        let shape = tensor.shape();
        let side = geometry.target_size as usize;
        if shape != [1, 1, side, side] {
            return Err(BgStudioError::inference(format!(
                "Unexpected output tensor shape {:?}, expected [1, 1, {}, {}]",
                shape, side, side
            )));
        }

        let (orig_width, orig_height) = original_dimensions;
        let mut data = Vec::with_capacity((orig_width * orig_height) as usize);
        for y in 0..orig_height {
            for x in 0..orig_width {
                let (cx, cy) = geometry.to_canvas(x, y);
                let value = tensor.get([0, 0, cy, cx]).copied().unwrap_or(0.0);
                data.push((value.clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }

        Ok(SegmentationMask::new(data, original_dimensions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ModelFamily;
    use image::Rgb;

    fn red_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([255, 0, 0])))
    }

    #[test]
    fn test_letterbox_geometry_landscape() {
        let geometry = LetterboxGeometry::fit((200, 100), 320).unwrap();
        assert_eq!(geometry.scaled_width, 320);
        assert_eq!(geometry.scaled_height, 160);
        assert_eq!(geometry.offset_x, 0);
        assert_eq!(geometry.offset_y, 80);
    }

    #[test]
    fn test_letterbox_rejects_empty() {
        assert!(LetterboxGeometry::fit((0, 10), 320).is_err());
    }

    #[test]
    fn test_preprocess_shape_and_padding() {
        let config = ModelFamily::U2Net.preprocessing();
        let (tensor, geometry) =
            ImagePreprocessor::preprocess_for_inference(&red_image(100, 50), &config).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 320, 320]);
        assert_eq!(geometry.offset_y, 80);

        // Padding is white, content is red
        let white_r = (1.0 - config.normalization_mean[0]) / config.normalization_std[0];
        let zero_g = (0.0 - config.normalization_mean[1]) / config.normalization_std[1];
        assert!((tensor[[0, 0, 0, 0]] - white_r).abs() < 1e-5);
        assert!((tensor[[0, 1, 160, 160]] - zero_g).abs() < 1e-5);
    }

    #[test]
    fn test_tensor_to_mask_uses_letterboxed_region() {
        let geometry = LetterboxGeometry::fit((4, 2), 8).unwrap();
        // Content occupies rows 2..6; mark it foreground
        let mut tensor = Array4::<f32>::zeros((1, 1, 8, 8));
        for y in 2..6 {
            for x in 0..8 {
                tensor[[0, 0, y, x]] = 1.0;
            }
        }

        let mask = ImagePreprocessor::tensor_to_mask(&tensor, &geometry, (4, 2)).unwrap();
        assert_eq!(mask.dimensions, (4, 2));
        assert!(mask.data.iter().all(|&v| v == 255));
    }

    #[test]
    fn test_tensor_to_mask_rejects_wrong_shape() {
        let geometry = LetterboxGeometry::fit((4, 4), 8).unwrap();
        let tensor = Array4::<f32>::zeros((1, 3, 8, 8));
        assert!(ImagePreprocessor::tensor_to_mask(&tensor, &geometry, (4, 4)).is_err());
    }
}
