use super::errors::ConfigError;
use super::scale_pyramid::{validate_min_face_size, validate_scale_factor};
use super::scoring_stage::StageKind;

pub const DEFAULT_SCALE_FACTOR: f64 = 0.709;
pub const DEFAULT_MIN_FACE_SIZE: f64 = 20.0;
pub const DEFAULT_SCORE_THRESHOLDS: [f32; 3] = [0.6, 0.7, 0.7];

/// IoU thresholds for the four suppression passes of one detection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NmsThresholds {
    /// Within one pyramid scale.
    pub per_scale: f32,
    /// Across all scales, before the Refine stage.
    pub cross_scale: f32,
    pub refine: f32,
    pub output: f32,
}

impl Default for NmsThresholds {
    fn default() -> Self {
        Self {
            per_scale: 0.5,
            cross_scale: 0.7,
            refine: 0.7,
            output: 0.7,
        }
    }
}

/// Detector parameters, fixed once the detector is built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeConfig {
    pub scale_factor: f64,
    pub min_face_size: f64,
    /// Proposal, Refine, Output.
    pub score_thresholds: [f32; 3],
    pub nms: NmsThresholds,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            score_thresholds: DEFAULT_SCORE_THRESHOLDS,
            nms: NmsThresholds::default(),
        }
    }
}

impl CascadeConfig {
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_min_face_size(mut self, min_face_size: f64) -> Self {
        self.min_face_size = min_face_size;
        self
    }

    pub fn with_score_thresholds(mut self, thresholds: [f32; 3]) -> Self {
        self.score_thresholds = thresholds;
        self
    }

    pub fn with_nms(mut self, nms: NmsThresholds) -> Self {
        self.nms = nms;
        self
    }

    /// Partial override: non-positive numbers and `None` keep the current value.
    pub fn with_overrides(
        mut self,
        scale_factor: f64,
        min_face_size: f64,
        score_thresholds: Option<[f32; 3]>,
    ) -> Self {
        if scale_factor > 0.0 {
            self.scale_factor = scale_factor;
        }
        if min_face_size > 0.0 {
            self.min_face_size = min_face_size;
        }
        if let Some(thresholds) = score_thresholds {
            self.score_thresholds = thresholds;
        }
        self
    }

    pub fn score_threshold(&self, stage: StageKind) -> f32 {
        match stage {
            StageKind::Proposal => self.score_thresholds[0],
            StageKind::Refine => self.score_thresholds[1],
            StageKind::Output => self.score_thresholds[2],
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_scale_factor(self.scale_factor)?;
        validate_min_face_size(self.min_face_size)?;

        for stage in [StageKind::Proposal, StageKind::Refine, StageKind::Output] {
            let value = self.score_threshold(stage);
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ScoreThreshold { stage, value });
            }
        }

        let nms = [
            ("per-scale", self.nms.per_scale),
            ("cross-scale", self.nms.cross_scale),
            ("refine", self.nms.refine),
            ("output", self.nms.output),
        ];
        for (name, value) in nms {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::IouThreshold { name, value });
            }
        }
        Ok(())
    }
}
