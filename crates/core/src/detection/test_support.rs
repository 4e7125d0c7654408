use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ndarray::{Array2, Array4, ArrayView4};

use super::domain::errors::ModelError;
use super::domain::image_transform::ImageTransform;
use super::domain::scoring_stage::{CascadeStages, ScoringStage, StageKind, StageOutput};
use crate::shared::image_tensor::ImageTensor;

pub(crate) fn stages(
    proposal: Arc<ProposalStage>,
    refine: Arc<PatchStage>,
    output: Arc<PatchStage>,
) -> CascadeStages {
    CascadeStages::new(proposal, refine, output)
}

/// Proposal stub: a 12 px / stride 2 grid that scores 0.1 everywhere, except
/// `hot` cells (0.9) on the level whose height is `hot_height`.
pub(crate) struct ProposalStage {
    hot_height: Option<usize>,
    hot: Vec<(usize, usize)>,
    calls: AtomicUsize,
}

impl ProposalStage {
    pub(crate) fn cold() -> Self {
        Self {
            hot_height: None,
            hot: Vec::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn hot_at(height: usize, cells: &[(usize, usize)]) -> Self {
        Self {
            hot_height: Some(height),
            hot: cells.to_vec(),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn grid(side: usize) -> usize {
    if side < 12 {
        0
    } else {
        (side - 12) / 2 + 1
    }
}

impl ScoringStage for ProposalStage {
    fn score(&self, batch: ArrayView4<'_, f32>) -> Result<StageOutput, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (height, width) = (batch.shape()[1], batch.shape()[2]);
        let (rows, cols) = (grid(height), grid(width));

        let mut scores = Array4::<f32>::zeros((1, rows, cols, 2));
        for i in 0..rows {
            for j in 0..cols {
                scores[[0, i, j, 0]] = 0.9;
                scores[[0, i, j, 1]] = 0.1;
            }
        }
        if self.hot_height == Some(height) {
            for &(i, j) in &self.hot {
                if i < rows && j < cols {
                    scores[[0, i, j, 0]] = 0.1;
                    scores[[0, i, j, 1]] = 0.9;
                }
            }
        }

        Ok(StageOutput {
            regression: Array4::<f32>::zeros((1, rows, cols, 4)).into_dyn(),
            scores: scores.into_dyn(),
            landmarks: None,
        })
    }
}

/// Refine/Output stub giving every patch the same score and regression.
pub(crate) struct PatchStage {
    face_score: f32,
    regression: [f32; 4],
    landmarks: Option<[f32; 10]>,
    fixed_batch: Option<usize>,
    calls: AtomicUsize,
}

impl PatchStage {
    pub(crate) fn scoring(face_score: f32) -> Self {
        Self {
            face_score,
            regression: [0.0; 4],
            landmarks: None,
            fixed_batch: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_regression(mut self, regression: [f32; 4]) -> Self {
        self.regression = regression;
        self
    }

    pub(crate) fn with_landmarks(mut self, landmarks: [f32; 10]) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    /// Always answer with `n` rows, whatever the batch size.
    pub(crate) fn with_fixed_batch(mut self, n: usize) -> Self {
        self.fixed_batch = Some(n);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScoringStage for PatchStage {
    fn score(&self, batch: ArrayView4<'_, f32>) -> Result<StageOutput, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let n = self.fixed_batch.unwrap_or(batch.shape()[0]);
        let [r0, r1, r2, r3] = self.regression;
        let regression = Array2::from_shape_fn((n, 4), |(_, k)| [r0, r1, r2, r3][k]);
        let scores = Array2::from_shape_fn((n, 2), |(_, k)| {
            if k == 1 {
                self.face_score
            } else {
                1.0 - self.face_score
            }
        });
        let landmarks = self
            .landmarks
            .map(|lm| Array2::from_shape_fn((n, 10), |(_, k)| lm[k]).into_dyn());

        Ok(StageOutput {
            regression: regression.into_dyn(),
            scores: scores.into_dyn(),
            landmarks,
        })
    }
}

pub(crate) struct FailingStage(pub(crate) StageKind);

impl ScoringStage for FailingStage {
    fn score(&self, _batch: ArrayView4<'_, f32>) -> Result<StageOutput, ModelError> {
        Err(ModelError::Inference {
            stage: self.0,
            message: "session closed".into(),
        })
    }
}

type CropCall = (Vec<[f32; 4]>, (usize, usize));

/// How a [`RecordingTransform`] misbehaves.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum TransformFault {
    #[default]
    None,
    Resize,
    Crop,
    /// Crops one patch fewer than there are boxes.
    DropPatch,
}

/// Transform stub returning zero batches of the requested size and
/// remembering what it was asked for.
#[derive(Default)]
pub(crate) struct RecordingTransform {
    fault: TransformFault,
    resizes: Mutex<Vec<(usize, usize)>>,
    crops: Mutex<Vec<CropCall>>,
}

impl RecordingTransform {
    pub(crate) fn failing(fault: TransformFault) -> Self {
        Self {
            fault,
            ..Self::default()
        }
    }

    pub(crate) fn resizes(&self) -> Vec<(usize, usize)> {
        self.resizes.lock().unwrap().clone()
    }

    pub(crate) fn crops(&self) -> Vec<CropCall> {
        self.crops.lock().unwrap().clone()
    }

    pub(crate) fn crop_calls(&self) -> usize {
        self.crops.lock().unwrap().len()
    }
}

impl ImageTransform for RecordingTransform {
    fn resize(
        &self,
        _image: &ImageTensor,
        height: usize,
        width: usize,
    ) -> Result<Array4<f32>, ModelError> {
        self.resizes.lock().unwrap().push((height, width));
        if self.fault == TransformFault::Resize {
            return Err(ModelError::Transform("resize failed".into()));
        }
        Ok(Array4::zeros((1, height, width, 3)))
    }

    fn crop_and_resize(
        &self,
        _image: &ImageTensor,
        boxes: &[[f32; 4]],
        height: usize,
        width: usize,
    ) -> Result<Array4<f32>, ModelError> {
        self.crops
            .lock()
            .unwrap()
            .push((boxes.to_vec(), (height, width)));
        match self.fault {
            TransformFault::Crop => Err(ModelError::Transform("crop failed".into())),
            TransformFault::DropPatch => Ok(Array4::zeros((
                boxes.len().saturating_sub(1),
                height,
                width,
                3,
            ))),
            _ => Ok(Array4::zeros((boxes.len(), height, width, 3))),
        }
    }
}
