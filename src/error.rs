use thiserror::Error;

/// Errors the pipeline raises on its own, before handing work to a model.
///
/// Model, inference and filesystem failures travel as `anyhow::Error`
/// with context attached at the call site.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("No image uploaded!")]
    MissingImage,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Segmentation model '{0}' is not supported")]
    UnsupportedModel(String),
}
