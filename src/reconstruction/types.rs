use super::triplane::SceneRepresentation;
use anyhow::Result;
use image::RgbImage;

/// Half-extent of the cube the implicit field is defined over
pub const DEFAULT_RADIUS: f32 = 0.87;

/// Implicit field value at one point in space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    pub density: f32,
    /// RGB in [0, 1]
    pub color: [f32; 3],
}

/// Trait for single-image reconstruction models
/// Allows swapping the ONNX backend for a test double
pub trait ReconstructionModel {
    /// Encode one image into a scene representation
    fn encode(&mut self, image: &RgbImage) -> Result<SceneRepresentation>;

    /// Evaluate the implicit field at `points`
    ///
    /// Returns one sample per point, in order.
    fn query(
        &mut self,
        scene: &SceneRepresentation,
        points: &[[f32; 3]],
    ) -> Result<Vec<FieldSample>>;

    /// Half-extent of the cube the field lives in
    fn radius(&self) -> f32 {
        DEFAULT_RADIUS
    }
}

impl<T: ReconstructionModel + ?Sized> ReconstructionModel for Box<T> {
    fn encode(&mut self, image: &RgbImage) -> Result<SceneRepresentation> {
        (**self).encode(image)
    }

    fn query(
        &mut self,
        scene: &SceneRepresentation,
        points: &[[f32; 3]],
    ) -> Result<Vec<FieldSample>> {
        (**self).query(scene, points)
    }

    fn radius(&self) -> f32 {
        (**self).radius()
    }
}
