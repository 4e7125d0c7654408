use std::path::PathBuf;

use thiserror::Error;

use super::scoring_stage::StageKind;

/// Invalid detector parameters. Raised at construction, never mid-cascade.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("scale factor must be in (0, 1), got {0}")]
    ScaleFactor(f64),
    #[error("minimum face size must be a positive number of pixels, got {0}")]
    MinFaceSize(f64),
    #[error("{stage} score threshold must be in [0, 1], got {value}")]
    ScoreThreshold { stage: StageKind, value: f32 },
    #[error("{name} IoU threshold must be in [0, 1], got {value}")]
    IouThreshold { name: &'static str, value: f32 },
    #[error("parallel proposal executor needs at least one worker")]
    Workers,
}

/// A scoring-stage or image-transform collaborator failed.
///
/// Always fatal for the current detection: the networks are deterministic,
/// so a retry would fail the same way.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("{stage} stage inference failed: {message}")]
    Inference { stage: StageKind, message: String },
    #[error("{stage} stage returned {actual}, expected {expected}")]
    OutputShape {
        stage: StageKind,
        expected: String,
        actual: String,
    },
    #[error("image transform failed: {0}")]
    Transform(String),
    #[error("failed to load model {path}: {message}")]
    Load { path: PathBuf, message: String },
    #[error("proposal worker panicked")]
    WorkerPanicked,
}

/// Everything [`super::cascade_detector::CascadeDetector::detect`] can fail with.
///
/// An empty result is not an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Model(#[from] ModelError),
}
