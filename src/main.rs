use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use image::DynamicImage;
use meshlift::preprocessor::require_image;
use meshlift::{
    reconstruction, registry, segmentation, ImagePreprocessor, ModelRegistry, Pipeline,
    ReconstructionConfig, RembgModel,
};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding TripoSR checkpoints (created if missing)
    #[arg(long, global = true, default_value = "models/TripoSR")]
    model_root: PathBuf,

    /// Directory holding background removal models (<name>.onnx)
    #[arg(long, global = true, default_value = "models/rembg")]
    rembg_dir: PathBuf,

    /// TOML preset with default settings; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remove the background and recenter the subject, without meshing
    Preprocess {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        preprocess: PreprocessArgs,
    },

    /// Preprocess the image and reconstruct a mesh
    Generate {
        #[command(flatten)]
        io: IoArgs,

        /// Also save the preprocessed image here
        #[arg(long)]
        save_processed: Option<PathBuf>,

        /// Checkpoint file name under the model root
        /// Defaults to the first one found
        #[arg(long)]
        checkpoint: Option<String>,

        #[command(flatten)]
        preprocess: PreprocessArgs,

        #[command(flatten)]
        mesh: MeshArgs,
    },

    /// List checkpoints and segmentation models
    Models,
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input image
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output file (PNG for preprocess, OBJ for generate)
    /// Generate defaults to a temporary file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PreprocessArgs {
    /// Remove the background before reconstruction
    #[arg(long)]
    remove_background: Option<bool>,

    /// Cutout model
    #[arg(long, value_enum)]
    rembg_model: Option<RembgModel>,

    /// Fraction of the frame the subject fills (0.5 - 1.0)
    #[arg(long)]
    foreground_ratio: Option<f32>,

    /// Refine cutout edges with alpha matting
    #[arg(long)]
    alpha_matting: Option<bool>,

    /// Alpha matting foreground threshold (0 - 255)
    #[arg(long)]
    matting_foreground_threshold: Option<u8>,

    /// Alpha matting background threshold (0 - 255)
    #[arg(long)]
    matting_background_threshold: Option<u8>,

    /// Alpha matting erode size (0 - 50)
    #[arg(long)]
    matting_erode_size: Option<u32>,
}

#[derive(Args, Debug)]
struct MeshArgs {
    /// Extraction grid samples per axis (16 - 512)
    #[arg(long)]
    resolution: Option<u32>,

    /// Iso-surface density threshold (0 - 100)
    #[arg(long)]
    threshold: Option<f32>,

    /// Points per model query (128 - 16384); affects memory, not output
    #[arg(long)]
    chunk_size: Option<usize>,
}

impl PreprocessArgs {
    fn apply(&self, config: &mut ReconstructionConfig) {
        let p = &mut config.preprocess;
        if let Some(v) = self.remove_background {
            p.remove_background = v;
        }
        if let Some(v) = self.rembg_model {
            p.model = v;
        }
        if let Some(v) = self.foreground_ratio {
            p.foreground_ratio = v;
        }
        if let Some(v) = self.alpha_matting {
            p.alpha_matting.enabled = v;
        }
        if let Some(v) = self.matting_foreground_threshold {
            p.alpha_matting.foreground_threshold = v;
        }
        if let Some(v) = self.matting_background_threshold {
            p.alpha_matting.background_threshold = v;
        }
        if let Some(v) = self.matting_erode_size {
            p.alpha_matting.erode_size = v;
        }
    }
}

impl MeshArgs {
    fn apply(&self, config: &mut ReconstructionConfig) {
        let m = &mut config.mesh;
        if let Some(v) = self.resolution {
            m.resolution = v;
        }
        if let Some(v) = self.threshold {
            m.threshold = v;
        }
        if let Some(v) = self.chunk_size {
            m.chunk_size = v;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    // Preset first, flags on top
    let mut config = match &cli.config {
        Some(path) => ReconstructionConfig::from_toml_file(path)?,
        None => ReconstructionConfig::default(),
    };

    match &cli.command {
        Command::Preprocess { io, preprocess } => {
            preprocess.apply(&mut config);
            run_preprocess(&cli, io, &config)
        }
        Command::Generate {
            io,
            save_processed,
            checkpoint,
            preprocess,
            mesh,
        } => {
            preprocess.apply(&mut config);
            mesh.apply(&mut config);
            run_generate(
                &cli,
                io,
                save_processed.as_deref(),
                checkpoint.as_deref(),
                &config,
            )
        }
        Command::Models => list_models(&cli),
    }
}

fn load_image(path: Option<&Path>) -> Result<Option<DynamicImage>> {
    path.map(|p| {
        tracing::info!("Loading image from {}", p.display());
        image::open(p).with_context(|| format!("Failed to open image {}", p.display()))
    })
    .transpose()
}

fn run_preprocess(cli: &Cli, io: &IoArgs, config: &ReconstructionConfig) -> Result<()> {
    let image = load_image(io.input.as_deref())?;
    let image = require_image(image.as_ref())?;
    config.validate()?;

    // Remove background and recenter
    let mut preprocessor = ImagePreprocessor::new(segmentation::create_default_remover(&cli.rembg_dir));
    let processed = preprocessor.process(Some(image), &config.preprocess)?;

    // Save next to the input unless told otherwise
    let output = match (&io.output, &io.input) {
        (Some(path), _) => path.clone(),
        (None, Some(input)) => processed_path_for(input),
        (None, None) => PathBuf::from("processed.png"),
    };
    processed
        .as_image()
        .save(&output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!("Preprocessed image written to {}", output.display());
    println!("{}", output.display());
    Ok(())
}

fn run_generate(
    cli: &Cli,
    io: &IoArgs,
    save_processed: Option<&Path>,
    checkpoint: Option<&str>,
    config: &ReconstructionConfig,
) -> Result<()> {
    let image = load_image(io.input.as_deref())?;
    // Fail fast before any model is loaded
    require_image(image.as_ref())?;
    config.validate()?;

    // Pick checkpoint
    let registry = ModelRegistry::new(&cli.model_root)?;
    let checkpoint = checkpoint
        .or_else(|| registry.default_filename())
        .with_context(|| format!("No checkpoints found under {}", registry.root().display()))?;
    let checkpoint_path = registry.resolve(checkpoint).with_context(|| {
        format!(
            "Checkpoint {} not found under {}",
            checkpoint,
            registry.root().display()
        )
    })?;

    // Load models
    tracing::info!("Loading reconstruction model {}", checkpoint);
    let model = reconstruction::create_default_model(&checkpoint_path)
        .context("Failed to load reconstruction model")?;
    let remover = segmentation::create_default_remover(&cli.rembg_dir);

    // Run pipeline
    let mut pipeline = Pipeline::new(remover, model);
    let generated = pipeline.generate(image.as_ref(), config, io.output.as_deref())?;

    if let Some(path) = save_processed {
        generated
            .processed
            .as_image()
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Preprocessed image written to {}", path.display());
    }

    println!("{}", generated.mesh.path.display());
    Ok(())
}

fn list_models(cli: &Cli) -> Result<()> {
    let registry = ModelRegistry::new(&cli.model_root)?;

    println!("Checkpoints in {}:", registry.root().display());
    if registry.filenames().is_empty() {
        println!("  (none)");
    }
    for name in registry.filenames() {
        println!("  {name}");
    }

    println!("Segmentation models:");
    for name in registry::segmentation_models() {
        let marker = if name == RembgModel::default().as_str() {
            " (default)"
        } else {
            ""
        };
        println!("  {name}{marker}");
    }
    Ok(())
}

fn processed_path_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image");
    input.with_file_name(format!("{stem}_processed.png"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset() -> ReconstructionConfig {
        ReconstructionConfig::from_toml(
            r#"
            [preprocess]
            model = "silueta"
            foreground_ratio = 0.7

            [preprocess.alpha_matting]
            enabled = true
            erode_size = 5

            [mesh]
            resolution = 128
            threshold = 30.0
            "#,
        )
        .unwrap()
    }

    #[test]
    fn flags_override_preset_values() {
        let cli = Cli::try_parse_from([
            "meshlift",
            "generate",
            "--rembg-model",
            "u2netp",
            "--matting-erode-size",
            "9",
            "--resolution",
            "64",
        ])
        .unwrap();
        let Command::Generate {
            preprocess, mesh, ..
        } = &cli.command
        else {
            panic!("expected generate");
        };

        let mut config = preset();
        preprocess.apply(&mut config);
        mesh.apply(&mut config);

        assert_eq!(config.preprocess.model, RembgModel::U2netp);
        assert_eq!(config.preprocess.alpha_matting.erode_size, 9);
        assert_eq!(config.mesh.resolution, 64);
    }

    #[test]
    fn unset_flags_keep_preset_values() {
        let preprocess = PreprocessArgs {
            remove_background: None,
            rembg_model: None,
            foreground_ratio: None,
            alpha_matting: None,
            matting_foreground_threshold: None,
            matting_background_threshold: None,
            matting_erode_size: None,
        };
        let mesh = MeshArgs {
            resolution: None,
            threshold: None,
            chunk_size: Some(1024),
        };

        let mut config = preset();
        preprocess.apply(&mut config);
        mesh.apply(&mut config);

        assert_eq!(config.preprocess.model, RembgModel::Silueta);
        assert_eq!(config.preprocess.foreground_ratio, 0.7);
        assert!(config.preprocess.alpha_matting.enabled);
        assert_eq!(config.mesh.threshold, 30.0);
        assert_eq!(config.mesh.resolution, 128);
        assert_eq!(config.mesh.chunk_size, 1024);
    }

    #[test]
    fn processed_image_lands_next_to_input() {
        assert_eq!(
            processed_path_for(Path::new("/tmp/chair.jpg")),
            PathBuf::from("/tmp/chair_processed.png")
        );
    }
}
