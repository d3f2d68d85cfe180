mod triplane;
mod tsr;
pub mod types;

pub use triplane::SceneRepresentation;
pub use tsr::{decoder_path_for, TripoSr};
pub use types::{FieldSample, ReconstructionModel, DEFAULT_RADIUS};

use anyhow::Result;
use std::path::Path;

/// Create the default reconstruction model (TripoSR ONNX export)
pub fn create_default_model<P: AsRef<Path>>(checkpoint: P) -> Result<Box<dyn ReconstructionModel>> {
    let model = TripoSr::new(checkpoint)?;
    Ok(Box::new(model))
}
