//! Test doubles for the model seams.

use crate::config::{AlphaMatting, RembgModel};
use crate::reconstruction::{FieldSample, ReconstructionModel, SceneRepresentation};
use crate::segmentation::BackgroundRemover;
use anyhow::Result;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use ndarray::Array4;

/// Cuts out a fixed opaque rectangle and counts its calls
pub struct RectRemover {
    pub calls: usize,
    pub rect: (u32, u32, u32, u32),
}

impl RectRemover {
    pub fn new(rect: (u32, u32, u32, u32)) -> Self {
        Self { calls: 0, rect }
    }
}

impl BackgroundRemover for RectRemover {
    fn remove_background(
        &mut self,
        image: &RgbImage,
        _model: RembgModel,
        _matting: &AlphaMatting,
    ) -> Result<RgbaImage> {
        self.calls += 1;
        let (rx, ry, rw, rh) = self.rect;
        Ok(RgbaImage::from_fn(image.width(), image.height(), |x, y| {
            let Rgb([r, g, b]) = *image.get_pixel(x, y);
            let inside = x >= rx && x < rx + rw && y >= ry && y < ry + rh;
            Rgba([r, g, b, if inside { 255 } else { 0 }])
        }))
    }
}

/// Density falls off linearly from the origin, `peak * (1 - r)`.
/// Color is `[x + 0.5, 2, -1]` so clamping is observable.
pub struct SphereModel {
    pub peak: f32,
    pub encode_calls: usize,
    pub query_calls: usize,
    pub largest_batch: usize,
}

impl SphereModel {
    pub fn new(peak: f32) -> Self {
        Self {
            peak,
            encode_calls: 0,
            query_calls: 0,
            largest_batch: 0,
        }
    }
}

pub fn empty_scene() -> SceneRepresentation {
    SceneRepresentation::new(Array4::zeros((3, 1, 1, 1))).expect("valid triplane shape")
}

impl ReconstructionModel for SphereModel {
    fn encode(&mut self, _image: &RgbImage) -> Result<SceneRepresentation> {
        self.encode_calls += 1;
        Ok(empty_scene())
    }

    fn query(
        &mut self,
        _scene: &SceneRepresentation,
        points: &[[f32; 3]],
    ) -> Result<Vec<FieldSample>> {
        self.query_calls += 1;
        self.largest_batch = self.largest_batch.max(points.len());
        Ok(points
            .iter()
            .map(|p| {
                let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
                FieldSample {
                    density: self.peak * (1.0 - r),
                    color: [p[0] + 0.5, 2.0, -1.0],
                }
            })
            .collect())
    }
}
