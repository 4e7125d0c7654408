use std::path::Path;
use std::sync::Mutex;

use ndarray::{Array4, ArrayD, ArrayView4, IxDyn};

use super::execution_provider::{preferred_execution_providers, provider_name};
use crate::detection::domain::errors::ModelError;
use crate::detection::domain::scoring_stage::{ScoringStage, StageKind, StageOutput};

/// Tensor layout a converted model was exported with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StageLayout {
    /// `[N, H, W, C]`, same as the cascade.
    Nhwc,
    /// `[N, C, H, W]`, the usual PyTorch / ONNX export.
    Nchw,
    /// `[N, W, H, C]`: width and height swapped, as in the Caffe-derived
    /// weights most published cascades are converted from.
    #[default]
    Nwhc,
}

impl StageLayout {
    /// Axis order taking an `[N, H, W, C]` batch to this layout.
    fn input_axes(self) -> [usize; 4] {
        match self {
            StageLayout::Nhwc => [0, 1, 2, 3],
            StageLayout::Nchw => [0, 3, 1, 2],
            StageLayout::Nwhc => [0, 2, 1, 3],
        }
    }

    /// Axis order taking a dense map in this layout back to `[N, rows, cols, C]`.
    fn output_axes(self) -> [usize; 4] {
        match self {
            StageLayout::Nhwc => [0, 1, 2, 3],
            StageLayout::Nchw => [0, 2, 3, 1],
            StageLayout::Nwhc => [0, 2, 1, 3],
        }
    }
}

/// Positions of the named tensors in the model's output list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputBinding {
    pub regression: usize,
    pub scores: usize,
    pub landmarks: Option<usize>,
}

impl OutputBinding {
    /// Output order of the reference cascade graphs: regression first, then
    /// (Output stage only) landmarks, then class probabilities.
    pub fn default_for(stage: StageKind) -> Self {
        match stage {
            StageKind::Proposal | StageKind::Refine => Self {
                regression: 0,
                scores: 1,
                landmarks: None,
            },
            StageKind::Output => Self {
                regression: 0,
                scores: 2,
                landmarks: Some(1),
            },
        }
    }
}

/// One cascade network in an ONNX Runtime session.
///
/// Batches arrive as `[N, H, W, 3]` row-major and maps leave row-major; the
/// per-model [`StageLayout`] is applied on the way in and out.
///
/// `Session::run` needs exclusive access, so the session sits behind a
/// mutex; concurrent proposal workers queue on it.
pub struct OnnxScoringStage {
    stage: StageKind,
    layout: StageLayout,
    binding: OutputBinding,
    session: Mutex<ort::session::Session>,
}

impl OnnxScoringStage {
    pub fn load(stage: StageKind, model_path: &Path, layout: StageLayout) -> Result<Self, ModelError> {
        let session = build_session(model_path).map_err(|e| ModelError::Load {
            path: model_path.to_path_buf(),
            message: e.to_string(),
        })?;
        log::info!(
            "Loaded {stage} model from {} ({})",
            model_path.display(),
            provider_name()
        );
        Ok(Self {
            stage,
            layout,
            binding: OutputBinding::default_for(stage),
            session: Mutex::new(session),
        })
    }

    fn infer(&self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>, Box<dyn std::error::Error>> {
        let input_value = ort::value::Tensor::from_array(input)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| format!("Lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs![input_value])?;

        let mut arrays = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            arrays.push(outputs[i].try_extract_array::<f32>()?.into_owned());
        }
        Ok(arrays)
    }
}

fn build_session(model_path: &Path) -> Result<ort::session::Session, Box<dyn std::error::Error>> {
    let session = ort::session::Session::builder()?
        .with_execution_providers(preferred_execution_providers())?
        .commit_from_file(model_path)?;
    Ok(session)
}

impl ScoringStage for OnnxScoringStage {
    fn score(&self, batch: ArrayView4<'_, f32>) -> Result<StageOutput, ModelError> {
        let input = to_model_layout(batch, self.layout);
        let outputs = self.infer(input).map_err(|e| ModelError::Inference {
            stage: self.stage,
            message: e.to_string(),
        })?;
        from_model_outputs(self.stage, self.layout, self.binding, outputs)
    }
}

// ---------------------------------------------------------------------------
// Layout conversion
// ---------------------------------------------------------------------------

fn to_model_layout(batch: ArrayView4<'_, f32>, layout: StageLayout) -> Array4<f32> {
    batch
        .permuted_axes(layout.input_axes())
        .as_standard_layout()
        .into_owned()
}

fn from_model_outputs(
    stage: StageKind,
    layout: StageLayout,
    binding: OutputBinding,
    outputs: Vec<ArrayD<f32>>,
) -> Result<StageOutput, ModelError> {
    let count = outputs.len();
    let mut slots: Vec<Option<ArrayD<f32>>> = outputs.into_iter().map(Some).collect();
    let mut take = |index: usize, what: &str| {
        slots
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| ModelError::OutputShape {
                stage,
                expected: format!("{what} at output {index}"),
                actual: format!("{count} outputs"),
            })
    };

    let regression = take(binding.regression, "regression")?;
    let scores = take(binding.scores, "scores")?;
    let landmarks = match binding.landmarks {
        Some(index) => Some(take(index, "landmarks")?),
        None => None,
    };

    match stage {
        StageKind::Proposal => Ok(StageOutput {
            regression: map_to_row_major(stage, layout, regression)?,
            scores: map_to_row_major(stage, layout, scores)?,
            landmarks: None,
        }),
        StageKind::Refine | StageKind::Output => Ok(StageOutput {
            regression: flatten_rows(regression),
            scores: flatten_rows(scores),
            landmarks: landmarks.map(flatten_rows),
        }),
    }
}

fn map_to_row_major(
    stage: StageKind,
    layout: StageLayout,
    map: ArrayD<f32>,
) -> Result<ArrayD<f32>, ModelError> {
    if map.ndim() != 4 {
        return Err(ModelError::OutputShape {
            stage,
            expected: "a rank-4 map".to_string(),
            actual: format!("{:?}", map.shape()),
        });
    }
    Ok(map
        .permuted_axes(IxDyn(&layout.output_axes()))
        .as_standard_layout()
        .into_owned())
}

/// `[N, k, 1, 1]` style outputs of 1x1-convolution heads become `[N, k]`.
fn flatten_rows(array: ArrayD<f32>) -> ArrayD<f32> {
    if array.ndim() <= 2 || array.shape()[0] == 0 {
        return array;
    }
    let rows = array.shape()[0];
    let cols = array.len() / rows;
    let standard = array.as_standard_layout().into_owned();
    match standard.into_shape_with_order(IxDyn(&[rows, cols])) {
        Ok(flat) => flat,
        Err(_) => array,
    }
}
