//! Single image to textured mesh.
//!
//! A request runs three stages in order: intake, preprocessing (background
//! removal, recentering, flattening) and reconstruction (scene encoding,
//! iso-surface extraction, OBJ export). The models behind the
//! [`segmentation::BackgroundRemover`] and
//! [`reconstruction::ReconstructionModel`] traits are ONNX Runtime sessions
//! by default.

pub mod config;
pub mod error;
pub mod mesh;
pub mod pipeline;
pub mod preprocessor;
pub mod reconstruction;
pub mod reconstructor;
pub mod registry;
pub mod segmentation;

#[cfg(test)]
mod test_support;

pub use config::{AlphaMatting, MeshConfig, PreprocessConfig, ReconstructionConfig, RembgModel};
pub use error::PipelineError;
pub use pipeline::{Generated, Pipeline};
pub use preprocessor::{ImagePreprocessor, ProcessedImage};
pub use reconstructor::{MeshArtifact, Reconstructor};
pub use registry::ModelRegistry;
