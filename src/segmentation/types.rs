use crate::config::{AlphaMatting, RembgModel};
use anyhow::Result;
use image::{GrayImage, RgbImage, RgbaImage};

/// Foreground mask: 0 = background, 255 = foreground.
/// Dimensions match the source image.
pub type Mask = GrayImage;

/// Trait for background removal services
/// Allows swapping the ONNX backend for a test double
pub trait BackgroundRemover {
    /// Cut the subject out of an opaque image
    ///
    /// # Arguments
    /// * `image` - Opaque RGB source
    /// * `model` - Segmentation model to run
    /// * `matting` - Edge refinement settings
    ///
    /// # Returns
    /// * RGBA cutout, same size as `image`, background transparent
    fn remove_background(
        &mut self,
        image: &RgbImage,
        model: RembgModel,
        matting: &AlphaMatting,
    ) -> Result<RgbaImage>;
}

impl<T: BackgroundRemover + ?Sized> BackgroundRemover for Box<T> {
    fn remove_background(
        &mut self,
        image: &RgbImage,
        model: RembgModel,
        matting: &AlphaMatting,
    ) -> Result<RgbaImage> {
        (**self).remove_background(image, model, matting)
    }
}

/// Input resolution and normalization a segmentation model was trained with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSpec {
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    /// Output channels are class scores rather than one foreground map
    pub multi_class: bool,
}

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

impl ModelSpec {
    pub fn for_model(model: RembgModel) -> Option<Self> {
        let spec = match model {
            RembgModel::U2net
            | RembgModel::U2netp
            | RembgModel::U2netHumanSeg
            | RembgModel::Silueta => ModelSpec {
                input_size: 320,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
                multi_class: false,
            },
            RembgModel::U2netClothSeg => ModelSpec {
                input_size: 768,
                mean: IMAGENET_MEAN,
                std: IMAGENET_STD,
                multi_class: true,
            },
            RembgModel::DisGeneralUse | RembgModel::DisAnime => ModelSpec {
                input_size: 1024,
                mean: IMAGENET_MEAN,
                std: [1.0, 1.0, 1.0],
                multi_class: false,
            },
            // Prompt-driven; needs point/box inputs this pipeline never has
            RembgModel::Sam => return None,
        };
        Some(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_model_but_sam_has_a_spec() {
        for model in RembgModel::ALL {
            let spec = ModelSpec::for_model(model);
            assert_eq!(spec.is_none(), model == RembgModel::Sam, "{model}");
        }
    }

    #[test]
    fn dis_models_run_at_1024() {
        let spec = ModelSpec::for_model(RembgModel::DisAnime).unwrap();
        assert_eq!(spec.input_size, 1024);
        assert_eq!(spec.std, [1.0; 3]);
    }
}
