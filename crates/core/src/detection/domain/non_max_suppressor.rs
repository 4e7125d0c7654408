use std::cmp::Ordering;

use super::candidate::CandidateSet;
use crate::shared::bounding_box::BoundingBox;

/// Suppress overlapping candidates, keeping the highest-scoring one per cluster.
///
/// The result is a subset of `candidates` in descending score order. Equal
/// scores are resolved by input position, so the outcome only depends on
/// the input order.
pub fn suppress(candidates: &CandidateSet, iou_threshold: f32) -> CandidateSet {
    let boxes = candidates.boxes();
    let scores = candidates.scores();
    let keep = suppress_indices(&boxes, &scores, iou_threshold);
    candidates.select(&keep)
}

/// Index form of [`suppress`]: positions of the kept boxes in selection order.
fn suppress_indices(boxes: &[BoundingBox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len(), "boxes and scores must be index-aligned");

    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; order.len()];

    for (rank, &i) in order.iter().enumerate() {
        if suppressed[rank] {
            continue;
        }
        keep.push(i);
        for (other_rank, &j) in order.iter().enumerate().skip(rank + 1) {
            if suppressed[other_rank] {
                continue;
            }
            if boxes[i].iou(&boxes[j]) > iou_threshold {
                suppressed[other_rank] = true;
            }
        }
    }
    keep
}
