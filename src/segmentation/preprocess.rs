use anyhow::{bail, Result};
use image::{imageops, GrayImage, RgbImage};
use ndarray::{Array4, ArrayViewD};

/// How raw 8-bit pixel values are scaled into [0, 1] before normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelScale {
    /// Divide by 255
    Fixed,
    /// Divide by the brightest channel value in the resized image
    ImageMax,
}

/// Preprocessor for converting RGB images to model input tensors
#[derive(Debug, Clone)]
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    mean: [f32; 3],
    std: [f32; 3],
    scale: PixelScale,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
            mean: [0.0; 3],
            std: [1.0; 3],
            scale: PixelScale::Fixed,
        }
    }

    pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
        self.mean = mean;
        self.std = std;
        self
    }

    pub fn with_scale(mut self, scale: PixelScale) -> Self {
        self.scale = scale;
        self
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Scale to [0, 1], then apply per-channel mean/std
    /// 3. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            image.clone()
        };

        let divisor = match self.scale {
            PixelScale::Fixed => 255.0,
            PixelScale::ImageMax => {
                let max = resized.as_raw().iter().copied().max().unwrap_or(0);
                (max as f32).max(1e-6)
            }
        };

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / divisor;
                tensor[[0, c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }

        tensor
    }
}

/// Turn a segmentation model output into a mask at the source resolution
///
/// `prediction` has shape [1, C, H, W]. Single-map models use channel 0,
/// min-max normalized. Multi-class models mark every pixel whose best
/// class is not background (class 0).
pub fn prediction_to_mask(
    prediction: &ArrayViewD<f32>,
    multi_class: bool,
    target_width: u32,
    target_height: u32,
) -> Result<GrayImage> {
    let _span = tracing::debug_span!("postprocess").entered();

    let shape = prediction.shape();
    if shape.len() != 4 || shape[0] == 0 || shape[1] == 0 {
        bail!("Unexpected segmentation output shape {:?}", shape);
    }
    let (channels, height, width) = (shape[1], shape[2], shape[3]);

    let mask = if multi_class {
        GrayImage::from_fn(width as u32, height as u32, |x, y| {
            let (x, y) = (x as usize, y as usize);
            let best = (0..channels)
                .max_by(|&a, &b| {
                    prediction[[0, a, y, x]].total_cmp(&prediction[[0, b, y, x]])
                })
                .unwrap_or(0);
            image::Luma([if best == 0 { 0 } else { 255 }])
        })
    } else {
        let (mut min, mut max) = (f32::INFINITY, f32::NEG_INFINITY);
        for y in 0..height {
            for x in 0..width {
                let v = prediction[[0, 0, y, x]];
                min = min.min(v);
                max = max.max(v);
            }
        }
        let range = (max - min).max(f32::EPSILON);
        GrayImage::from_fn(width as u32, height as u32, |x, y| {
            let v = (prediction[[0, 0, y as usize, x as usize]] - min) / range;
            image::Luma([(v * 255.0).clamp(0.0, 255.0) as u8])
        })
    };

    if mask.dimensions() == (target_width, target_height) {
        return Ok(mask);
    }

    Ok(imageops::resize(
        &mask,
        target_width,
        target_height,
        imageops::FilterType::Lanczos3,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn tensor_is_nchw_and_normalized() {
        let image = RgbImage::from_pixel(4, 2, image::Rgb([255, 0, 51]));
        let tensor = Preprocessor::new(4, 2).preprocess(&image);

        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        assert!((tensor[[0, 0, 1, 3]] - 1.0).abs() < 1e-6);
        assert_eq!(tensor[[0, 1, 0, 0]], 0.0);
        assert!((tensor[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn image_max_scaling_uses_brightest_value() {
        let image = RgbImage::from_pixel(2, 2, image::Rgb([100, 50, 0]));
        let tensor = Preprocessor::new(2, 2)
            .with_scale(PixelScale::ImageMax)
            .with_normalization([0.5; 3], [0.5; 3])
            .preprocess(&image);

        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 0, 0]] - 0.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 0, 0]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn single_map_prediction_is_min_max_normalized() {
        let mut pred = Array4::<f32>::zeros((1, 1, 2, 2));
        pred[[0, 0, 0, 0]] = -3.0;
        pred[[0, 0, 1, 1]] = 5.0;
        let view = pred.into_dyn();
        let mask = prediction_to_mask(&view.view(), false, 2, 2).unwrap();

        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
    }

    #[test]
    fn multi_class_prediction_marks_non_background() {
        let mut pred = Array4::<f32>::zeros((1, 4, 1, 2));
        pred[[0, 0, 0, 0]] = 3.0;
        pred[[0, 2, 0, 1]] = 3.0;
        let view = pred.into_dyn();
        let mask = prediction_to_mask(&view.view(), true, 2, 1).unwrap();

        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert_eq!(mask.get_pixel(1, 0)[0], 255);
    }

    #[test]
    fn rejects_unexpected_rank() {
        let pred = ndarray::Array2::<f32>::zeros((2, 2)).into_dyn();
        assert!(prediction_to_mask(&pred.view(), false, 2, 2).is_err());
    }
}
