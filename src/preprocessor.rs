use crate::config::PreprocessConfig;
use crate::error::PipelineError;
use crate::segmentation::BackgroundRemover;
use anyhow::{Context, Result};
use image::{imageops, DynamicImage, GenericImageView, RgbImage, RgbaImage};

/// Backdrop value transparency is flattened onto, in [0, 1]
pub const BACKDROP: f32 = 0.5;

/// Image ready for reconstruction: background handled, no live transparency
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedImage(DynamicImage);

impl ProcessedImage {
    pub fn as_image(&self) -> &DynamicImage {
        &self.0
    }

    pub fn into_image(self) -> DynamicImage {
        self.0
    }

    pub fn to_rgb8(&self) -> RgbImage {
        self.0.to_rgb8()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.0.dimensions()
    }
}

/// Fail fast when no image was supplied
pub fn require_image(image: Option<&DynamicImage>) -> Result<&DynamicImage, PipelineError> {
    image.ok_or(PipelineError::MissingImage)
}

/// First pipeline stage: background removal, recentering and flattening
pub struct ImagePreprocessor<R> {
    remover: R,
}

impl<R: BackgroundRemover> ImagePreprocessor<R> {
    pub fn new(remover: R) -> Self {
        Self { remover }
    }

    pub fn remover(&self) -> &R {
        &self.remover
    }

    pub fn process(
        &mut self,
        image: Option<&DynamicImage>,
        config: &PreprocessConfig,
    ) -> Result<ProcessedImage> {
        let image = require_image(image)?;
        config.validate()?;

        let _span = tracing::debug_span!("preprocess_image").entered();
        let (width, height) = image.dimensions();

        if config.remove_background {
            tracing::info!(
                "Removing background from {}x{} image with {}",
                width,
                height,
                config.model
            );
            let cutout = self
                .remover
                .remove_background(&image.to_rgb8(), config.model, &config.alpha_matting)
                .context("Failed to remove background")?;
            let centered = resize_foreground(&cutout, config.foreground_ratio);
            let flattened = fill_background(&centered);
            tracing::info!(
                "Preprocessed image is {}x{}",
                flattened.width(),
                flattened.height()
            );
            return Ok(ProcessedImage(DynamicImage::ImageRgb8(flattened)));
        }

        if has_transparency(image) {
            tracing::info!("Flattening transparency of {}x{} image", width, height);
            let flattened = fill_background(&image.to_rgba8());
            return Ok(ProcessedImage(DynamicImage::ImageRgb8(flattened)));
        }

        tracing::debug!("Image is opaque, passing through");
        Ok(ProcessedImage(image.clone()))
    }
}

/// True when the image has an alpha channel with at least one non-opaque pixel
pub fn has_transparency(image: &DynamicImage) -> bool {
    if !image.color().has_alpha() {
        return false;
    }
    match image {
        DynamicImage::ImageLumaA8(buf) => buf.pixels().any(|p| p[1] < u8::MAX),
        DynamicImage::ImageRgba8(buf) => buf.pixels().any(|p| p[3] < u8::MAX),
        DynamicImage::ImageLumaA16(buf) => buf.pixels().any(|p| p[1] < u16::MAX),
        DynamicImage::ImageRgba16(buf) => buf.pixels().any(|p| p[3] < u16::MAX),
        DynamicImage::ImageRgba32F(buf) => buf.pixels().any(|p| p[3] < 1.0),
        other => other.to_rgba8().pixels().any(|p| p[3] < u8::MAX),
    }
}

/// Composite an RGBA image onto the mid-gray backdrop
///
/// Per channel, in [0, 1]: `out = fg * a + BACKDROP * (1 - a)`.
pub fn fill_background(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let pixel = image.get_pixel(x, y);
        let alpha = pixel[3] as f32 / 255.0;
        let blend = |c: u8| {
            let fg = c as f32 / 255.0;
            let out = fg * alpha + BACKDROP * (1.0 - alpha);
            (out * 255.0).round().clamp(0.0, 255.0) as u8
        };
        image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])])
    })
}

/// Bounding box `(x, y, width, height)` of pixels with nonzero alpha
pub fn foreground_bounds(image: &RgbaImage) -> Option<(u32, u32, u32, u32)> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel[3] == 0 {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    bounds.map(|(x0, y0, x1, y1)| (x0, y0, x1 - x0 + 1, y1 - y0 + 1))
}

/// Recenter the subject on a square canvas it fills to `ratio`
///
/// The subject is cropped to its alpha bounding box, centered on a square
/// of its longer side, then that square is centered on a larger square of
/// side `floor(side / ratio)`. Padding is fully transparent.
pub fn resize_foreground(image: &RgbaImage, ratio: f32) -> RgbaImage {
    let Some((x, y, width, height)) = foreground_bounds(image) else {
        tracing::warn!("Cutout has no foreground pixels, leaving it uncropped");
        return image.clone();
    };

    let subject = imageops::crop_imm(image, x, y, width, height).to_image();
    let side = width.max(height);
    let canvas_side = ((side as f32 / ratio).floor() as u32).max(side);

    let mut canvas = RgbaImage::new(canvas_side, canvas_side);
    let margin = (canvas_side - side) / 2;
    let offset_x = margin + (side - width) / 2;
    let offset_y = margin + (side - height) / 2;
    imageops::replace(&mut canvas, &subject, offset_x as i64, offset_y as i64);

    tracing::debug!(
        "Recentered {}x{} subject on {}x{} canvas",
        width,
        height,
        canvas_side,
        canvas_side
    );
    canvas
}
