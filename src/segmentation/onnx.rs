use super::matting;
use super::preprocess::{prediction_to_mask, PixelScale, Preprocessor};
use super::types::{BackgroundRemover, ModelSpec};
use crate::config::{AlphaMatting, RembgModel};
use crate::error::PipelineError;
use anyhow::{bail, Context, Result};
use image::{RgbImage, RgbaImage};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};

/// Open an ONNX Runtime session, preferring CUDA and falling back to CPU
pub(crate) fn open_session(path: &Path) -> Result<Session> {
    let session = Session::builder()?
        .with_execution_providers([CUDAExecutionProvider::default().build()])?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(4)?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load model from {}", path.display()))?;
    Ok(session)
}

/// Background removal through rembg-family ONNX models
///
/// Models are looked up as `<name>.onnx` under `model_dir` and loaded on
/// first use. Only the most recently requested model stays loaded.
pub struct OnnxBackgroundRemover {
    model_dir: PathBuf,
    loaded: Option<(RembgModel, Session)>,
}

impl OnnxBackgroundRemover {
    pub fn new<P: AsRef<Path>>(model_dir: P) -> Self {
        Self {
            model_dir: model_dir.as_ref().to_path_buf(),
            loaded: None,
        }
    }

    fn session(&mut self, model: RembgModel) -> Result<&mut Session> {
        let stale = !matches!(&self.loaded, Some((current, _)) if *current == model);
        if stale {
            let path = self.model_dir.join(model.file_name());
            if !path.is_file() {
                bail!("Segmentation model not found at {}", path.display());
            }
            tracing::info!("Loading segmentation model {} from {}", model, path.display());
            let session = open_session(&path)?;
            tracing::info!("Segmentation model {} loaded successfully", model);
            self.loaded = Some((model, session));
        }

        let (_, session) = self
            .loaded
            .as_mut()
            .context("Segmentation session missing after load")?;
        Ok(session)
    }
}

impl BackgroundRemover for OnnxBackgroundRemover {
    fn remove_background(
        &mut self,
        image: &RgbImage,
        model: RembgModel,
        matting: &AlphaMatting,
    ) -> Result<RgbaImage> {
        let _span = tracing::debug_span!("remove_background", model = %model).entered();

        let spec = ModelSpec::for_model(model)
            .ok_or_else(|| PipelineError::UnsupportedModel(model.to_string()))?;

        let input = Preprocessor::new(spec.input_size, spec.input_size)
            .with_normalization(spec.mean, spec.std)
            .with_scale(PixelScale::ImageMax)
            .preprocess(image);

        let session = self.session(model)?;

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = session
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("Failed to run segmentation inference")?;
        drop(_infer_span);

        let prediction = outputs[0].try_extract_array::<f32>()?;
        let (width, height) = image.dimensions();
        let mask = prediction_to_mask(&prediction, spec.multi_class, width, height)?;

        Ok(matting::cutout(image, &mask, matting))
    }
}
