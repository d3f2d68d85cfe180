use crate::config::MeshConfig;
use crate::mesh::{self, Mesh};
use crate::preprocessor::ProcessedImage;
use crate::reconstruction::ReconstructionModel;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A mesh written to disk, ready for display or download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshArtifact {
    pub path: PathBuf,
    pub vertex_count: usize,
    pub face_count: usize,
}

/// Second pipeline stage: image → scene → mesh file
pub struct Reconstructor<M> {
    model: M,
}

impl<M: ReconstructionModel> Reconstructor<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Encode the image and extract a viewer-oriented mesh
    pub fn reconstruct(&mut self, image: &ProcessedImage, config: &MeshConfig) -> Result<Mesh> {
        config.validate()?;

        let (width, height) = image.dimensions();
        tracing::info!("Encoding {}x{} image", width, height);
        let scene = self
            .model
            .encode(&image.to_rgb8())
            .context("Failed to encode image into a scene")?;

        tracing::info!(
            "Extracting mesh at resolution {} threshold {}",
            config.resolution,
            config.threshold
        );
        let mut mesh = mesh::extract_mesh(
            &mut self.model,
            &scene,
            config.resolution,
            config.threshold,
            config.chunk_size,
        )
        .context("Failed to extract mesh")?;

        if mesh.is_empty() {
            tracing::warn!("No surface found at threshold {}", config.threshold);
        }

        mesh::to_viewer_orientation(&mut mesh);
        Ok(mesh)
    }

    /// Reconstruct and write the mesh as OBJ
    ///
    /// Without `output` the mesh goes to a new temporary file.
    pub fn generate(
        &mut self,
        image: &ProcessedImage,
        config: &MeshConfig,
        output: Option<&Path>,
    ) -> Result<MeshArtifact> {
        let mesh = self.reconstruct(image, config)?;

        let path = match output {
            Some(path) => mesh::export_obj(&mesh, path)?,
            None => mesh::export_temp_obj(&mesh)?,
        };

        tracing::info!(
            "Wrote mesh with {} vertices and {} faces to {}",
            mesh.vertex_count(),
            mesh.face_count(),
            path.display()
        );

        Ok(MeshArtifact {
            path,
            vertex_count: mesh.vertex_count(),
            face_count: mesh.face_count(),
        })
    }
}
