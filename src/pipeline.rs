use crate::config::ReconstructionConfig;
use crate::preprocessor::{require_image, ImagePreprocessor, ProcessedImage};
use crate::reconstruction::ReconstructionModel;
use crate::reconstructor::{MeshArtifact, Reconstructor};
use crate::segmentation::BackgroundRemover;
use anyhow::Result;
use image::DynamicImage;
use std::path::Path;
use std::time::Instant;

/// Result of a full generate request
#[derive(Debug, Clone)]
pub struct Generated {
    pub processed: ProcessedImage,
    pub mesh: MeshArtifact,
}

/// Intake → Preprocessor → Reconstructor, one request at a time
///
/// Owns both model handles for its lifetime. Each call runs its stages in
/// order and stops at the first failure.
pub struct Pipeline<R, M> {
    preprocessor: ImagePreprocessor<R>,
    reconstructor: Reconstructor<M>,
}

impl<R, M> Pipeline<R, M>
where
    R: BackgroundRemover,
    M: ReconstructionModel,
{
    pub fn new(remover: R, model: M) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(remover),
            reconstructor: Reconstructor::new(model),
        }
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor<R> {
        &self.preprocessor
    }

    pub fn reconstructor(&self) -> &Reconstructor<M> {
        &self.reconstructor
    }

    /// Run only the preprocessing stage
    pub fn preprocess_only(
        &mut self,
        image: Option<&DynamicImage>,
        config: &ReconstructionConfig,
    ) -> Result<ProcessedImage> {
        let image = require_image(image)?;
        self.preprocessor.process(Some(image), &config.preprocess)
    }

    /// Preprocess the image, then reconstruct and export its mesh
    ///
    /// The mesh goes to `output` when given, otherwise to a temporary file.
    pub fn generate(
        &mut self,
        image: Option<&DynamicImage>,
        config: &ReconstructionConfig,
        output: Option<&Path>,
    ) -> Result<Generated> {
        // Nothing runs without an image or with a bad config
        let image = require_image(image)?;
        config.validate()?;

        // Preprocess
        let start = Instant::now();
        let processed = self.preprocessor.process(Some(image), &config.preprocess)?;
        let preprocess_time = start.elapsed();

        // Reconstruct and export
        let start = Instant::now();
        let mesh = self.reconstructor.generate(&processed, &config.mesh, output)?;
        let reconstruct_time = start.elapsed();

        tracing::info!(
            "Generated in preprocess={:.1}ms, reconstruct={:.1}ms",
            preprocess_time.as_secs_f64() * 1000.0,
            reconstruct_time.as_secs_f64() * 1000.0
        );

        Ok(Generated { processed, mesh })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::test_support::{RectRemover, SphereModel};
    use image::{Rgb, RgbImage};

    fn pipeline() -> Pipeline<RectRemover, SphereModel> {
        Pipeline::new(RectRemover::new((8, 8, 16, 16)), SphereModel::new(100.0))
    }

    fn small_config() -> ReconstructionConfig {
        let mut config = ReconstructionConfig::default();
        config.mesh.resolution = 32;
        config.mesh.threshold = 50.0;
        config
    }

    fn photo() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([90, 60, 30])))
    }

    #[test]
    fn generate_without_image_never_reaches_a_stage() {
        let mut pipeline = pipeline();
        let err = pipeline
            .generate(None, &small_config(), None)
            .unwrap_err();

        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::MissingImage)
        );
        assert_eq!(pipeline.preprocessor().remover().calls, 0);
        assert_eq!(pipeline.reconstructor().model().encode_calls, 0);
        assert_eq!(pipeline.reconstructor().model().query_calls, 0);
    }

    #[test]
    fn preprocess_only_without_image_fails() {
        let mut pipeline = pipeline();
        let err = pipeline
            .preprocess_only(None, &small_config())
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<PipelineError>(),
            Some(&PipelineError::MissingImage)
        );
        assert_eq!(pipeline.preprocessor().remover().calls, 0);
    }

    #[test]
    fn invalid_mesh_settings_stop_before_preprocessing() {
        let mut pipeline = pipeline();
        let mut config = small_config();
        config.mesh.resolution = 1024;

        assert!(pipeline.generate(Some(&photo()), &config, None).is_err());
        assert_eq!(pipeline.preprocessor().remover().calls, 0);
        assert_eq!(pipeline.reconstructor().model().encode_calls, 0);
    }

    #[test]
    fn generate_runs_every_stage_once() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("mesh.obj");
        let mut pipeline = pipeline();

        let generated = pipeline
            .generate(Some(&photo()), &small_config(), Some(&output))
            .unwrap();

        assert_eq!(pipeline.preprocessor().remover().calls, 1);
        assert_eq!(pipeline.reconstructor().model().encode_calls, 1);
        assert_eq!(generated.mesh.path, output);
        assert!(generated.mesh.face_count > 0);
        assert!(!generated.processed.as_image().color().has_alpha());

        let text = std::fs::read_to_string(&output).unwrap();
        let vertices = text.lines().filter(|l| l.starts_with("v ")).count();
        assert_eq!(vertices, generated.mesh.vertex_count);
    }

    #[test]
    fn repeated_generation_gives_the_same_mesh_size() {
        let mut pipeline = pipeline();
        let first = pipeline.generate(Some(&photo()), &small_config(), None).unwrap();
        let second = pipeline.generate(Some(&photo()), &small_config(), None).unwrap();

        assert_ne!(first.mesh.path, second.mesh.path);
        assert_eq!(first.mesh.vertex_count, second.mesh.vertex_count);
        assert_eq!(first.mesh.face_count, second.mesh.face_count);

        std::fs::remove_file(first.mesh.path).unwrap();
        std::fs::remove_file(second.mesh.path).unwrap();
    }
}
