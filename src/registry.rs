use crate::config::RembgModel;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const CHECKPOINT_EXTENSIONS: [&str; 4] = ["pt", "ckpt", "safetensors", "onnx"];

/// Suffix of the decoder graph exported next to each ONNX encoder
pub const DECODER_SUFFIX: &str = "_decoder.onnx";

/// Checkpoint files available under a model-storage root
///
/// The list only changes when [`ModelRegistry::refresh`] is called.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    root: PathBuf,
    extensions: Vec<String>,
    filenames: Vec<String>,
}

impl ModelRegistry {
    /// Open a registry rooted at `root`, creating the directory if needed
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::with_extensions(root, &CHECKPOINT_EXTENSIONS)
    }

    pub fn with_extensions<P: AsRef<Path>>(root: P, extensions: &[&str]) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create model directory {}", root.display()))?;

        let mut registry = Self {
            root,
            extensions: extensions.iter().map(|e| e.to_ascii_lowercase()).collect(),
            filenames: Vec::new(),
        };
        registry.refresh()?;
        Ok(registry)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Names from the last refresh
    pub fn filenames(&self) -> &[String] {
        &self.filenames
    }

    /// The checkpoint a fresh session starts with
    ///
    /// Loadable ONNX encoders win over other formats; otherwise the first
    /// listed name.
    pub fn default_filename(&self) -> Option<&str> {
        self.filenames
            .iter()
            .find(|name| is_onnx_encoder(name))
            .or_else(|| self.filenames.first())
            .map(String::as_str)
    }

    /// Walk the root again and return the sorted file names
    pub fn refresh(&mut self) -> Result<&[String]> {
        let mut filenames = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry
                .with_context(|| format!("Failed to scan {}", self.root.display()))?;
            if !entry.file_type().is_file() || !self.is_checkpoint(entry.path()) {
                continue;
            }
            // Decoder graphs are loaded through their encoder
            match entry.file_name().to_str() {
                Some(name) if !is_decoder_graph(name) => filenames.push(name.to_string()),
                _ => {}
            }
        }
        filenames.sort();

        tracing::debug!(
            "Found {} checkpoints under {}",
            filenames.len(),
            self.root.display()
        );
        self.filenames = filenames;
        Ok(&self.filenames)
    }

    /// Full path of a listed checkpoint, searching subdirectories
    pub fn resolve(&self, filename: &str) -> Option<PathBuf> {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .find(|e| e.file_type().is_file() && e.file_name().to_str() == Some(filename))
            .map(|e| e.into_path())
    }

    fn is_checkpoint(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}

fn is_decoder_graph(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(DECODER_SUFFIX)
}

fn is_onnx_encoder(name: &str) -> bool {
    Path::new(name).extension().and_then(|e| e.to_str()) == Some("onnx")
}

/// Segmentation model names in display order
pub fn segmentation_models() -> Vec<&'static str> {
    RembgModel::ALL.iter().map(|m| m.as_str()).collect()
}
