use ndarray::{ArrayView3, Axis};

use super::candidate::{Candidate, CandidateSet, Landmarks};
use super::scoring_stage::PatchRows;
use crate::shared::bounding_box::{BoundingBox, RegressionDelta};
use crate::shared::constants::{PROPOSAL_CELL_SIZE, PROPOSAL_STRIDE};

/// Decode a Proposal map at `scale` into candidates, in row-major cell order.
///
/// Every cell above `threshold` is a 12x12 window (stride 2) in the scaled
/// image, projected back to the original image.
///
/// `scores` is `[rows, cols, 2]` and `regression` is `[rows, cols, 4]`.
pub fn generate(
    scores: ArrayView3<'_, f32>,
    regression: ArrayView3<'_, f32>,
    scale: f64,
    threshold: f32,
) -> CandidateSet {
    debug_assert_eq!(scores.shape()[..2], regression.shape()[..2]);

    let face = scores.index_axis(Axis(2), 1);
    let mut out = CandidateSet::new();
    for ((i, j), &score) in face.indexed_iter() {
        if score <= threshold {
            continue;
        }
        let reg = regression.slice(ndarray::s![i, j, ..]);
        out.push(Candidate::new(
            cell_box(i, j, scale),
            RegressionDelta::new(reg[0], reg[1], reg[2], reg[3]),
            score,
        ));
    }
    out
}

/// Image-space window of Proposal cell `(row, col)` at `scale`.
pub fn cell_box(row: usize, col: usize, scale: f64) -> BoundingBox {
    let project = |offset: f64| ((offset + 1.0) / scale + 0.5).floor() as f32;
    let x = PROPOSAL_STRIDE * col as f64;
    let y = PROPOSAL_STRIDE * row as f64;
    BoundingBox {
        x1: project(x),
        y1: project(y),
        x2: project(x + PROPOSAL_CELL_SIZE),
        y2: project(y + PROPOSAL_CELL_SIZE),
    }
}

/// Re-score `candidates` with a Refine/Output result, keeping rows above
/// `threshold`.
///
/// Survivors keep their box, take the stage's regression and score, and,
/// when the stage returns landmarks, get them decoded against that box.
pub fn filter(candidates: &CandidateSet, rows: &PatchRows<'_>, threshold: f32) -> CandidateSet {
    candidates
        .iter()
        .enumerate()
        .filter_map(|(n, c)| {
            let score = rows.scores[[n, 1]];
            if score <= threshold {
                return None;
            }
            let reg = rows.regression.row(n);
            let landmarks = rows.landmarks.as_ref().map(|lm| {
                let lm = lm.row(n);
                decode_landmarks(&c.bbox, |k| lm[k])
            });
            Some(Candidate {
                bbox: c.bbox,
                delta: RegressionDelta::new(reg[0], reg[1], reg[2], reg[3]),
                score,
                landmarks,
            })
        })
        .collect()
}

/// Landmark offsets are five x values then five y values, each relative to
/// the pixel-inclusive size of the box the stage was given.
fn decode_landmarks(bbox: &BoundingBox, offset: impl Fn(usize) -> f32) -> Landmarks {
    let w = bbox.width() + 1.0;
    let h = bbox.height() + 1.0;
    let mut points = [(0.0, 0.0); 5];
    for (k, point) in points.iter_mut().enumerate() {
        *point = (bbox.x1 + w * offset(k), bbox.y1 + h * offset(5 + k));
    }
    points
}
