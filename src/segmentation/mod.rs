pub mod matting;
mod onnx;
mod preprocess;
pub mod types;

pub use onnx::OnnxBackgroundRemover;
pub(crate) use onnx::open_session;
pub use preprocess::{prediction_to_mask, PixelScale, Preprocessor};
pub use types::{BackgroundRemover, Mask, ModelSpec};

use std::path::Path;

/// Create the default background remover (rembg ONNX models)
pub fn create_default_remover<P: AsRef<Path>>(model_dir: P) -> Box<dyn BackgroundRemover> {
    Box::new(OnnxBackgroundRemover::new(model_dir))
}
