use std::fmt;
use std::sync::Arc;

use ndarray::{ArrayD, ArrayView2, ArrayView3, ArrayView4, Axis, Ix2, Ix4};

use super::errors::ModelError;

/// Which of the three cascade networks a scorer implements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Proposal,
    Refine,
    Output,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Proposal => "proposal",
            StageKind::Refine => "refine",
            StageKind::Output => "output",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Raw tensors returned by one scoring call.
///
/// Layouts, with `N` the batch size:
/// - Proposal: `regression [1, rows, cols, 4]`, `scores [1, rows, cols, 2]`,
///   with rows/cols in image (row-major) orientation.
/// - Refine/Output: `regression [N, 4]`, `scores [N, 2]`, and for Output
///   optionally `landmarks [N, 10]`.
///
/// `scores[..., 1]` is the face-class confidence.
#[derive(Clone, Debug, PartialEq)]
pub struct StageOutput {
    pub regression: ArrayD<f32>,
    pub scores: ArrayD<f32>,
    pub landmarks: Option<ArrayD<f32>>,
}

/// Per-patch rows of a Refine/Output result, validated against the batch size.
pub struct PatchRows<'a> {
    pub regression: ArrayView2<'a, f32>,
    pub scores: ArrayView2<'a, f32>,
    pub landmarks: Option<ArrayView2<'a, f32>>,
}

impl StageOutput {
    /// Dense Proposal maps as `(regression [rows, cols, 4], scores [rows, cols, 2])`.
    pub fn proposal_maps(&self) -> Result<(ArrayView3<'_, f32>, ArrayView3<'_, f32>), ModelError> {
        let stage = StageKind::Proposal;
        let regression = self
            .regression
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| shape_error(stage, "[1, rows, cols, 4]", self.regression.shape()))?;
        let scores = self
            .scores
            .view()
            .into_dimensionality::<Ix4>()
            .map_err(|_| shape_error(stage, "[1, rows, cols, 2]", self.scores.shape()))?;

        let (rs, ss) = (regression.shape(), scores.shape());
        if rs[0] != 1 || rs[3] < 4 {
            return Err(shape_error(stage, "[1, rows, cols, 4]", rs));
        }
        if ss[0] != 1 || ss[3] < 2 || ss[1] != rs[1] || ss[2] != rs[2] {
            return Err(shape_error(stage, "scores [1, rows, cols, 2] matching regression", ss));
        }

        Ok((
            regression.index_axis_move(Axis(0), 0),
            scores.index_axis_move(Axis(0), 0),
        ))
    }

    /// Flat per-patch rows for the Refine/Output stages.
    pub fn patch_rows(&self, stage: StageKind, batch: usize) -> Result<PatchRows<'_>, ModelError> {
        let regression = self
            .regression
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| shape_error(stage, &format!("[{batch}, 4]"), self.regression.shape()))?;
        let scores = self
            .scores
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| shape_error(stage, &format!("[{batch}, 2]"), self.scores.shape()))?;

        if regression.nrows() != batch || regression.ncols() < 4 {
            return Err(shape_error(stage, &format!("[{batch}, 4]"), regression.shape()));
        }
        if scores.nrows() != batch || scores.ncols() < 2 {
            return Err(shape_error(stage, &format!("[{batch}, 2]"), scores.shape()));
        }

        let landmarks = match &self.landmarks {
            Some(lm) => {
                let lm = lm
                    .view()
                    .into_dimensionality::<Ix2>()
                    .map_err(|_| shape_error(stage, &format!("[{batch}, 10]"), lm.shape()))?;
                if lm.nrows() != batch || lm.ncols() < 10 {
                    return Err(shape_error(stage, &format!("[{batch}, 10]"), lm.shape()));
                }
                Some(lm)
            }
            None => None,
        };

        Ok(PatchRows {
            regression,
            scores,
            landmarks,
        })
    }
}

fn shape_error(stage: StageKind, expected: &str, actual: &[usize]) -> ModelError {
    ModelError::OutputShape {
        stage,
        expected: expected.to_string(),
        actual: format!("{actual:?}"),
    }
}

/// One neural scoring network of the cascade.
///
/// Input is a batch of normalized patches `[N, H, W, 3]` in row-major
/// orientation. Implementations must be safe for concurrent read-only use:
/// the same stage may be called from several proposal workers at once.
pub trait ScoringStage: Send + Sync {
    fn score(&self, batch: ArrayView4<'_, f32>) -> Result<StageOutput, ModelError>;
}

/// The three networks, in cascade order.
#[derive(Clone)]
pub struct CascadeStages {
    pub proposal: Arc<dyn ScoringStage>,
    pub refine: Arc<dyn ScoringStage>,
    pub output: Arc<dyn ScoringStage>,
}

impl CascadeStages {
    pub fn new(
        proposal: Arc<dyn ScoringStage>,
        refine: Arc<dyn ScoringStage>,
        output: Arc<dyn ScoringStage>,
    ) -> Self {
        Self {
            proposal,
            refine,
            output,
        }
    }

    pub fn get(&self, kind: StageKind) -> &dyn ScoringStage {
        match kind {
            StageKind::Proposal => self.proposal.as_ref(),
            StageKind::Refine => self.refine.as_ref(),
            StageKind::Output => self.output.as_ref(),
        }
    }
}
