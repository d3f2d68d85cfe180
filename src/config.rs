use crate::error::PipelineError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

pub const FOREGROUND_RATIO_RANGE: (f32, f32) = (0.5, 1.0);
pub const ERODE_SIZE_MAX: u32 = 50;
pub const RESOLUTION_RANGE: (u32, u32) = (16, 512);
pub const THRESHOLD_RANGE: (f32, f32) = (0.0, 100.0);
pub const CHUNK_SIZE_RANGE: (usize, usize) = (128, 16384);

/// Segmentation models selectable for background removal
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum RembgModel {
    #[value(name = "dis_anime")]
    DisAnime,
    #[default]
    #[value(name = "dis_general_use")]
    DisGeneralUse,
    #[value(name = "sam")]
    Sam,
    #[value(name = "silueta")]
    Silueta,
    #[value(name = "u2net_cloth_seg")]
    U2netClothSeg,
    #[value(name = "u2net_human_seg")]
    U2netHumanSeg,
    #[value(name = "u2net")]
    U2net,
    #[value(name = "u2netp")]
    U2netp,
}

impl RembgModel {
    pub const ALL: [RembgModel; 8] = [
        RembgModel::DisAnime,
        RembgModel::DisGeneralUse,
        RembgModel::Sam,
        RembgModel::Silueta,
        RembgModel::U2netClothSeg,
        RembgModel::U2netHumanSeg,
        RembgModel::U2net,
        RembgModel::U2netp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RembgModel::DisAnime => "dis_anime",
            RembgModel::DisGeneralUse => "dis_general_use",
            RembgModel::Sam => "sam",
            RembgModel::Silueta => "silueta",
            RembgModel::U2netClothSeg => "u2net_cloth_seg",
            RembgModel::U2netHumanSeg => "u2net_human_seg",
            RembgModel::U2net => "u2net",
            RembgModel::U2netp => "u2netp",
        }
    }

    /// ONNX file name expected in the segmentation model directory
    pub fn file_name(&self) -> String {
        format!("{}.onnx", self.as_str())
    }
}

impl fmt::Display for RembgModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alpha matting refinement applied to the segmentation cutout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlphaMatting {
    pub enabled: bool,
    /// Mask values above this are known foreground
    pub foreground_threshold: u8,
    /// Mask values below this are known background
    pub background_threshold: u8,
    /// Pixels to erode from both known regions
    pub erode_size: u32,
}

impl Default for AlphaMatting {
    fn default() -> Self {
        Self {
            enabled: false,
            foreground_threshold: 240,
            background_threshold: 10,
            erode_size: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub remove_background: bool,
    pub model: RembgModel,
    /// Fraction of the frame the subject occupies after recentering
    pub foreground_ratio: f32,
    pub alpha_matting: AlphaMatting,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            remove_background: true,
            model: RembgModel::default(),
            foreground_ratio: 0.85,
            alpha_matting: AlphaMatting::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Samples per axis of the extraction grid
    pub resolution: u32,
    /// Density value at which the surface is extracted
    pub threshold: f32,
    /// Points per decoder query. Changes memory use, not output.
    pub chunk_size: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            resolution: 256,
            threshold: 25.0,
            chunk_size: 8192,
        }
    }
}

/// Every user-tunable knob of one preprocess/generate request
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub preprocess: PreprocessConfig,
    pub mesh: MeshConfig,
}

impl ReconstructionConfig {
    /// Load a preset from a TOML file. Missing keys take their defaults.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ReconstructionConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.preprocess.validate()?;
        self.mesh.validate()
    }
}

impl PreprocessConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let (lo, hi) = FOREGROUND_RATIO_RANGE;
        if !(lo..=hi).contains(&self.foreground_ratio) {
            return Err(PipelineError::InvalidConfig(format!(
                "foreground ratio {} outside {}..={}",
                self.foreground_ratio, lo, hi
            )));
        }
        if self.alpha_matting.erode_size > ERODE_SIZE_MAX {
            return Err(PipelineError::InvalidConfig(format!(
                "alpha matting erode size {} exceeds {}",
                self.alpha_matting.erode_size, ERODE_SIZE_MAX
            )));
        }
        // sam needs prompts; fail before any model is loaded
        if self.remove_background && self.model == RembgModel::Sam {
            return Err(PipelineError::UnsupportedModel(self.model.to_string()));
        }
        Ok(())
    }
}

impl MeshConfig {
    pub fn validate(&self) -> Result<(), PipelineError> {
        let (lo, hi) = RESOLUTION_RANGE;
        if !(lo..=hi).contains(&self.resolution) {
            return Err(PipelineError::InvalidConfig(format!(
                "resolution {} outside {}..={}",
                self.resolution, lo, hi
            )));
        }
        let (lo, hi) = THRESHOLD_RANGE;
        if !(lo..=hi).contains(&self.threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "threshold {} outside {}..={}",
                self.threshold, lo, hi
            )));
        }
        let (lo, hi) = CHUNK_SIZE_RANGE;
        if !(lo..=hi).contains(&self.chunk_size) {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk size {} outside {}..={}",
                self.chunk_size, lo, hi
            )));
        }
        Ok(())
    }
}
