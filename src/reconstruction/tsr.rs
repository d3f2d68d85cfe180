use super::triplane::SceneRepresentation;
use super::types::{FieldSample, ReconstructionModel, DEFAULT_RADIUS};
use crate::registry::DECODER_SUFFIX;
use crate::segmentation::{open_session, Preprocessor};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use ndarray::{Array2, Array4, Ix5};
use ort::session::Session;
use ort::value::Tensor;
use std::path::{Path, PathBuf};

/// Side length the encoder expects its input image at
const CONDITION_SIZE: u32 = 512;

/// TripoSR-style triplane reconstruction through two ONNX graphs
///
/// * encoder: image `[1, 3, 512, 512]` in [0, 1] → triplanes `[1, 3, C, H, W]`
/// * decoder: features `[N, 3C]` → density `[N, 1]` (activated) and
///   color `[N, 3]` in [0, 1]
///
/// The decoder graph sits next to the encoder with a `_decoder` suffix:
/// `model.onnx` pairs with `model_decoder.onnx`.
pub struct TripoSr {
    encoder: Session,
    decoder: Session,
    preprocessor: Preprocessor,
    radius: f32,
}

impl TripoSr {
    pub fn new<P: AsRef<Path>>(encoder_path: P) -> Result<Self> {
        let encoder_path = encoder_path.as_ref();
        let decoder_path = decoder_path_for(encoder_path)?;

        for path in [encoder_path, decoder_path.as_path()] {
            if !path.is_file() {
                bail!("Reconstruction model not found at {}", path.display());
            }
        }

        tracing::info!("Loading TripoSR encoder from {}", encoder_path.display());
        let encoder = open_session(encoder_path)?;
        tracing::info!("Loading TripoSR decoder from {}", decoder_path.display());
        let decoder = open_session(&decoder_path)?;
        tracing::info!("TripoSR model loaded successfully");

        Ok(Self {
            encoder,
            decoder,
            preprocessor: Preprocessor::new(CONDITION_SIZE, CONDITION_SIZE),
            radius: DEFAULT_RADIUS,
        })
    }
}

/// Sibling decoder graph for an encoder checkpoint
pub fn decoder_path_for(encoder_path: &Path) -> Result<PathBuf> {
    match encoder_path.extension().and_then(|e| e.to_str()) {
        Some("onnx") => {}
        Some(ext) => bail!(
            "Checkpoint {} is a .{} file; only ONNX exports can be loaded",
            encoder_path.display(),
            ext
        ),
        None => bail!("Checkpoint {} has no extension", encoder_path.display()),
    }
    let stem = encoder_path
        .file_stem()
        .and_then(|s| s.to_str())
        .with_context(|| format!("Invalid checkpoint name {}", encoder_path.display()))?;
    Ok(encoder_path.with_file_name(format!("{stem}{DECODER_SUFFIX}")))
}

impl ReconstructionModel for TripoSr {
    fn encode(&mut self, image: &RgbImage) -> Result<SceneRepresentation> {
        let _span = tracing::debug_span!("tsr_encode").entered();

        let input = self.preprocessor.preprocess(image);
        let outputs = self
            .encoder
            .run(ort::inputs![Tensor::from_array(input)?])
            .context("Failed to run reconstruction encoder")?;

        let codes = outputs[0]
            .try_extract_array::<f32>()?
            .to_owned()
            .into_dimensionality::<Ix5>()
            .context("Encoder output is not shaped [1, 3, C, H, W]")?;
        let (_, planes, channels, height, width) = codes.dim();
        let planes: Array4<f32> = codes
            .into_shape_with_order((planes, channels, height, width))
            .context("Encoder returned more than one scene")?;

        tracing::debug!("Scene codes: 3 x {} x {} x {}", channels, height, width);
        SceneRepresentation::new(planes)
    }

    fn query(
        &mut self,
        scene: &SceneRepresentation,
        points: &[[f32; 3]],
    ) -> Result<Vec<FieldSample>> {
        let _span = tracing::trace_span!("tsr_query", points = points.len()).entered();

        let feature_len = scene.feature_len();
        let mut features = Array2::<f32>::zeros((points.len(), feature_len));
        for (row, point) in features.outer_iter_mut().zip(points) {
            let row = row.into_slice().context("Feature row is not contiguous")?;
            scene.sample_into(*point, self.radius, row);
        }

        let outputs = self
            .decoder
            .run(ort::inputs![Tensor::from_array(features)?])
            .context("Failed to run reconstruction decoder")?;

        let density = outputs[0].try_extract_array::<f32>()?;
        let color = outputs[1].try_extract_array::<f32>()?;
        if density.len() != points.len() || color.len() != points.len() * 3 {
            bail!(
                "Decoder returned {} densities and {} color values for {} points",
                density.len(),
                color.len(),
                points.len()
            );
        }

        let density: Vec<f32> = density.iter().copied().collect();
        let color: Vec<f32> = color.iter().copied().collect();
        Ok(density
            .into_iter()
            .zip(color.chunks_exact(3))
            .map(|(density, rgb)| FieldSample {
                density,
                color: [rgb[0], rgb[1], rgb[2]],
            })
            .collect())
    }

    fn radius(&self) -> f32 {
        self.radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoder_sits_next_to_encoder() {
        let path = decoder_path_for(Path::new("/models/TripoSR/model.onnx")).unwrap();
        assert_eq!(path, PathBuf::from("/models/TripoSR/model_decoder.onnx"));
    }

    #[test]
    fn torch_checkpoints_are_rejected() {
        let err = decoder_path_for(Path::new("model.ckpt")).unwrap_err();
        assert!(err.to_string().contains("only ONNX"));
    }

    #[test]
    fn missing_graphs_fail_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = dir.path().join("model.onnx");
        std::fs::write(&encoder, b"").unwrap();
        let err = TripoSr::new(&encoder).err().unwrap();
        assert!(err.to_string().contains("model_decoder.onnx"));
    }
}
