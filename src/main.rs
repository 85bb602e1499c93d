use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use photo_fx::output::{default_export_name, PngFileSink};
use photo_fx::segmentation::{self, ModelSource, SegmentationConfig, SegmentationService};
use photo_fx::source::{FileSource, ImageSource};
use photo_fx::{BackgroundKind, Color, EditParams, Editor, RunOutcome};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Source image
    input: PathBuf,

    /// Output PNG path (default: <input stem>-edited.png next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JSON parameter file; individual flags override its values
    #[arg(long)]
    params: Option<PathBuf>,

    /// Brightness percent (100 = unchanged)
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=200))]
    brightness: Option<u16>,

    /// Contrast percent (100 = unchanged)
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=200))]
    contrast: Option<u16>,

    /// Saturation percent (100 = unchanged)
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=200))]
    saturation: Option<u16>,

    /// Whole-image blur radius in pixels
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=20))]
    blur: Option<u16>,

    /// Separate the subject and replace its background
    #[arg(long)]
    remove_background: bool,

    /// What to put behind the subject
    #[arg(long, value_enum)]
    background: Option<BackgroundKind>,

    /// Background fill color (#rrggbb)
    #[arg(long)]
    background_color: Option<Color>,

    /// Background image, cover-fitted to the canvas
    #[arg(long)]
    background_image: Option<PathBuf>,

    /// Background blur radius in pixels
    #[arg(long, value_parser = clap::value_parser!(u16).range(0..=20))]
    background_blur: Option<u16>,

    /// Precomputed foreground mask image (white = subject)
    #[arg(long, conflicts_with = "model")]
    mask: Option<PathBuf>,

    /// Path to ONNX segmentation model (requires the `onnx` feature)
    #[arg(long)]
    model: Option<PathBuf>,

    /// Foreground probability threshold
    #[arg(long, default_value_t = 0.8)]
    threshold: f32,

    /// Give up on segmentation after this many seconds
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn edit_params(&self) -> Result<EditParams> {
        let mut params = match &self.params {
            Some(path) => {
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Invalid parameter file {}", path.display()))?
            }
            None => EditParams::default(),
        };

        let adjustments = &mut params.adjustments;
        adjustments.brightness = self.brightness.unwrap_or(adjustments.brightness);
        adjustments.contrast = self.contrast.unwrap_or(adjustments.contrast);
        adjustments.saturation = self.saturation.unwrap_or(adjustments.saturation);
        adjustments.blur_px = self.blur.unwrap_or(adjustments.blur_px);

        params.remove_background |= self.remove_background;
        params.background = self.background.unwrap_or(params.background);
        params.background_color = self.background_color.unwrap_or(params.background_color);
        params.background_blur_px = self.background_blur.unwrap_or(params.background_blur_px);

        // An image on the command line implies the image background.
        if self.background_image.is_some() && self.background.is_none() {
            params.background = BackgroundKind::Image;
        }

        params.validate()?;
        Ok(params)
    }

    fn model_source(&self) -> Option<ModelSource> {
        match (&self.mask, &self.model) {
            (Some(mask), _) => Some(ModelSource::MaskImage(mask.clone())),
            (None, Some(model)) => Some(ModelSource::Onnx(model.clone())),
            (None, None) => None,
        }
    }

    fn output_path(&self, source_name: &str) -> PathBuf {
        self.output.clone().unwrap_or_else(|| {
            let dir = self.input.parent().unwrap_or_else(|| Path::new(""));
            dir.join(default_export_name(source_name))
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("photo-fx starting");

    let params = args.edit_params()?;
    tracing::info!(
        "Adjustments: brightness={} contrast={} saturation={} blur={}px",
        params.adjustments.brightness,
        params.adjustments.contrast,
        params.adjustments.saturation,
        params.adjustments.blur_px
    );

    let editor = match args.model_source() {
        Some(source) => {
            tracing::info!("Segmentation source: {:?}", source);
            let config = SegmentationConfig {
                threshold: args.threshold,
                timeout: Duration::from_secs(args.timeout_secs),
            };
            let service = SegmentationService::with_loader(segmentation::loader_for(source), config);
            Editor::with_segmenter(Arc::new(service))
        }
        None => {
            if params.remove_background {
                tracing::warn!("Background removal requested without --mask or --model");
            }
            Editor::new()
        }
    };

    let started = Instant::now();

    let mut source = FileSource::new(&args.input);
    let image = source.load().context("Failed to load source image")?;
    // Loading the source resets parameters, so its own run is superseded
    // by the one scheduled below.
    editor.load_source(image);

    if let Some(path) = &args.background_image {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read background image {}", path.display()))?;
        editor
            .load_background_image(bytes)
            .await
            .context("Failed to load background image")?;
    }

    let outcome = editor
        .set_params(params)?
        .await
        .context("Pipeline task panicked")?;

    match outcome {
        RunOutcome::Published => {}
        RunOutcome::Failed(err) => return Err(err).context("Failed to process image"),
        other => bail!("Pipeline did not publish a result ({:?})", other),
    }

    let output_path = args.output_path(source.name());
    let mut sink = PngFileSink::new(&output_path);
    editor
        .export(&mut sink)
        .with_context(|| format!("Failed to export {}", output_path.display()))?;

    tracing::info!("Done in {:.1}ms", started.elapsed().as_secs_f64() * 1000.0);
    Ok(())
}
