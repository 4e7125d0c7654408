use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;

use facecascade_core::detection::domain::candidate::FaceDetection;
use facecascade_core::detection::domain::cascade_config::CascadeConfig;
use facecascade_core::detection::domain::cascade_detector::CascadeDetector;
use facecascade_core::detection::domain::scoring_stage::{CascadeStages, StageKind};
use facecascade_core::detection::infrastructure::bilinear_image_transform::BilinearImageTransform;
use facecascade_core::detection::infrastructure::onnx_scoring_stage::{
    OnnxScoringStage, StageLayout,
};
use facecascade_core::detection::infrastructure::threaded_proposal_executor::ThreadedProposalExecutor;
use facecascade_core::io::face_crop_writer::FaceCropWriter;
use facecascade_core::io::image_file_reader::ImageFileReader;
use facecascade_core::io::overlay_writer::BoxOverlayWriter;
use facecascade_core::pipeline::detect_faces_use_case::{DetectFacesUseCase, DetectionReport};
use facecascade_core::shared::constants::{DEFAULT_CROP_SIZE, IMAGE_EXTENSIONS};
use facecascade_core::shared::model_resolver::{self, ModelSources};

/// Three-stage cascaded face detection for still images.
#[derive(Parser)]
#[command(name = "facecascade")]
struct Cli {
    /// Input image file.
    input: PathBuf,

    /// Pyramid shrink factor between scales, in (0, 1). 0 keeps the default (0.709).
    #[arg(long, default_value = "0")]
    scale_factor: f64,

    /// Smallest face to look for, in pixels. 0 keeps the default (20).
    #[arg(long, default_value = "0")]
    min_face_size: f64,

    /// Score thresholds of the proposal, refine and output stages (comma-separated).
    #[arg(long, value_delimiter = ',')]
    thresholds: Option<Vec<f32>>,

    /// Pixels added on every side of each reported box.
    #[arg(long, default_value = "0")]
    margin: f32,

    /// Worker threads for the proposal stage (0 = run scales sequentially).
    #[arg(long, default_value = "0")]
    workers: usize,

    /// Directory holding pnet.onnx, rnet.onnx and onet.onnx.
    #[arg(long)]
    models: Option<PathBuf>,

    /// Base URL to download missing models from.
    #[arg(long)]
    model_url: Option<String>,

    /// Tensor layout of the models: nwhc, nchw or nhwc.
    #[arg(long, default_value = "nwhc")]
    layout: String,

    /// Save one crop per face to this directory.
    #[arg(long)]
    crops: Option<PathBuf>,

    /// Edge length of saved face crops, in pixels.
    #[arg(long, default_value_t = DEFAULT_CROP_SIZE)]
    crop_size: u32,

    /// Save a copy of the input with the faces shaded.
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Print detections as JSON.
    #[arg(long)]
    json: bool,

    /// Print per-stage candidate counts and timings to stderr.
    #[arg(long)]
    stats: bool,
}

/// One face as printed by `--json`.
#[derive(Serialize)]
struct FaceJson {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
    landmarks: Option<Vec<[f32; 2]>>,
}

impl From<&FaceDetection> for FaceJson {
    fn from(face: &FaceDetection) -> Self {
        Self {
            x1: face.bbox.x1,
            y1: face.bbox.y1,
            x2: face.bbox.x2,
            y2: face.bbox.y2,
            score: face.score,
            landmarks: face
                .landmarks
                .map(|points| points.iter().map(|&(x, y)| [x, y]).collect()),
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let detector = build_detector(&cli)?;
    let mut use_case = DetectFacesUseCase::new(Box::new(ImageFileReader::new()), detector, cli.margin);
    if let Some(dir) = &cli.crops {
        use_case = use_case.with_crops(Box::new(FaceCropWriter::new(cli.crop_size)), dir.clone());
    }
    if let Some(path) = &cli.overlay {
        use_case = use_case.with_overlay(Box::new(BoxOverlayWriter::new()), path.clone());
    }

    let report = use_case.execute(&cli.input)?;
    if cli.stats {
        eprintln!("{}", report.stats.summary_string());
    }
    print_report(&cli, &report)?;

    if let Some(dir) = &cli.crops {
        log::info!("Saved {} face crops to {}", report.crops.len(), dir.display());
    }
    if let Some(path) = &cli.overlay {
        log::info!("Result saved to {}", path.display());
    }
    Ok(())
}

fn print_report(cli: &Cli, report: &DetectionReport) -> Result<(), Box<dyn std::error::Error>> {
    if cli.json {
        let faces: Vec<FaceJson> = report.faces.iter().map(FaceJson::from).collect();
        println!("{}", serde_json::to_string_pretty(&faces)?);
        return Ok(());
    }

    if report.faces.is_empty() {
        println!("No face found");
        return Ok(());
    }
    println!("{} faces found in {}", report.faces.len(), cli.input.display());
    for face in &report.faces {
        let b = face.bbox;
        println!("{:.1} {:.1} {:.1} {:.1} {:.4}", b.x1, b.y1, b.x2, b.y2, face.score);
    }
    Ok(())
}

fn build_detector(cli: &Cli) -> Result<CascadeDetector, Box<dyn std::error::Error>> {
    let sources = ModelSources {
        dir: cli.models.as_deref(),
        base_url: cli.model_url.as_deref(),
    };
    let progress: model_resolver::ProgressFn = Box::new(download_progress);
    let paths = model_resolver::resolve_cascade(sources, Some(&progress))?;

    let layout = parse_layout(&cli.layout)?;
    let stages = CascadeStages::new(
        Arc::new(OnnxScoringStage::load(StageKind::Proposal, &paths.proposal, layout)?),
        Arc::new(OnnxScoringStage::load(StageKind::Refine, &paths.refine, layout)?),
        Arc::new(OnnxScoringStage::load(StageKind::Output, &paths.output, layout)?),
    );

    let thresholds = cli
        .thresholds
        .as_ref()
        .map(|t| [t[0], t[1], t[2]]);
    let config = CascadeConfig::default().with_overrides(cli.scale_factor, cli.min_face_size, thresholds);

    let detector = CascadeDetector::new(config, stages, Arc::new(BilinearImageTransform::new()))?;
    if cli.workers > 0 {
        Ok(detector.with_executor(Box::new(ThreadedProposalExecutor::new(cli.workers)?)))
    } else {
        Ok(detector)
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if !cli.input.exists() {
        return Err(format!("Input file not found: {}", cli.input.display()).into());
    }
    if !is_image(&cli.input) {
        return Err(format!(
            "Input must be an image ({}), got {}",
            IMAGE_EXTENSIONS.join(", "),
            cli.input.display()
        )
        .into());
    }
    if cli.scale_factor < 0.0 || cli.scale_factor >= 1.0 {
        return Err(format!(
            "Scale factor must be between 0.0 and 1.0, got {}",
            cli.scale_factor
        )
        .into());
    }
    if cli.min_face_size < 0.0 {
        return Err(format!(
            "Minimum face size must not be negative, got {}",
            cli.min_face_size
        )
        .into());
    }
    if let Some(t) = &cli.thresholds {
        if t.len() != 3 {
            return Err(format!("--thresholds takes 3 values, got {}", t.len()).into());
        }
        if let Some(bad) = t.iter().find(|v| !(0.0..=1.0).contains(*v)) {
            return Err(format!("Thresholds must be between 0.0 and 1.0, got {bad}").into());
        }
    }
    if cli.margin < 0.0 {
        return Err(format!("Margin must not be negative, got {}", cli.margin).into());
    }
    if cli.crop_size == 0 {
        return Err("Crop size must be positive".into());
    }
    if let Some(dir) = &cli.models {
        if !dir.is_dir() {
            return Err(format!("Model directory not found: {}", dir.display()).into());
        }
    }
    parse_layout(&cli.layout)?;
    Ok(())
}

fn parse_layout(layout: &str) -> Result<StageLayout, Box<dyn std::error::Error>> {
    match layout {
        "nwhc" => Ok(StageLayout::Nwhc),
        "nchw" => Ok(StageLayout::Nchw),
        "nhwc" => Ok(StageLayout::Nhwc),
        other => Err(format!("Layout must be 'nwhc', 'nchw' or 'nhwc', got '{other}'").into()),
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading cascade model... {pct}%");
    } else {
        eprint!("\rDownloading cascade model... {downloaded} bytes");
    }
}
