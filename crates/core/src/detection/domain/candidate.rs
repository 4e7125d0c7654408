
use super::box_calibrator;
use crate::shared::bounding_box::{BoundingBox, RegressionDelta};

/// Five facial points (eyes, nose, mouth corners) in image pixels.
pub type Landmarks = [(f32, f32); 5];

/// One face hypothesis: geometry, pending regression, and confidence.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: BoundingBox,
    pub delta: RegressionDelta,
    pub score: f32,
    pub landmarks: Option<Landmarks>,
}

impl Candidate {
    pub fn new(bbox: BoundingBox, delta: RegressionDelta, score: f32) -> Self {
        Self {
            bbox,
            delta,
            score,
            landmarks: None,
        }
    }
}

/// The candidates alive at one point of the cascade.
///
/// Box, regression and score travel together in one record, so filtering
/// or suppression can never leave them out of step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CandidateSet {
    candidates: Vec<Candidate>,
}

impl CandidateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            candidates: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    /// Append `other`, preserving both orders.
    pub fn append(&mut self, mut other: CandidateSet) {
        self.candidates.append(&mut other.candidates);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn boxes(&self) -> Vec<BoundingBox> {
        self.candidates.iter().map(|c| c.bbox).collect()
    }

    pub fn scores(&self) -> Vec<f32> {
        self.candidates.iter().map(|c| c.score).collect()
    }

    /// Keep the candidates at `indices`, in the order given.
    pub fn select(&self, indices: &[usize]) -> Self {
        indices.iter().map(|&i| self.candidates[i]).collect()
    }

    /// Apply every pending regression delta, optionally squaring the result.
    ///
    /// The delta is consumed: calibrated candidates carry a zero delta.
    pub fn calibrate(self, square: bool) -> Self {
        self.candidates
            .into_iter()
            .map(|c| Candidate {
                bbox: box_calibrator::calibrate(&c.bbox, &c.delta, square),
                delta: RegressionDelta::ZERO,
                ..c
            })
            .collect()
    }

    /// Crop coordinates for every box, see [`BoundingBox::to_normalized`].
    pub fn normalized_boxes(&self, image_width: usize, image_height: usize) -> Vec<[f32; 4]> {
        let (w, h) = (image_width as f32, image_height as f32);
        self.candidates
            .iter()
            .map(|c| c.bbox.to_normalized(w, h))
            .collect()
    }
}

impl FromIterator<Candidate> for CandidateSet {
    fn from_iter<I: IntoIterator<Item = Candidate>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for CandidateSet {
    type Item = Candidate;
    type IntoIter = std::vec::IntoIter<Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Candidate;
    type IntoIter = std::slice::Iter<'a, Candidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}

/// A face that survived all three stages.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub landmarks: Option<Landmarks>,
}

impl From<Candidate> for FaceDetection {
    fn from(c: Candidate) -> Self {
        Self {
            bbox: c.bbox,
            score: c.score,
            landmarks: c.landmarks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn candidate(x: f32, score: f32) -> Candidate {
        Candidate::new(
            BoundingBox::new(x, 0.0, x + 9.0, 9.0),
            RegressionDelta::new(0.1, 0.0, 0.1, 0.0),
            score,
        )
    }

    #[test]
    fn test_select_keeps_records_together() {
        let set: CandidateSet = (0..4).map(|i| candidate(i as f32 * 20.0, i as f32 / 10.0)).collect();
        let picked = set.select(&[3, 1]);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked.as_slice()[0], set.as_slice()[3]);
        assert_eq!(picked.as_slice()[1], set.as_slice()[1]);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut a: CandidateSet = vec![candidate(0.0, 0.9)].into_iter().collect();
        let b: CandidateSet = vec![candidate(20.0, 0.8), candidate(40.0, 0.7)]
            .into_iter()
            .collect();
        a.append(b);
        assert_eq!(a.scores(), vec![0.9, 0.8, 0.7]);
    }

    #[test]
    fn test_calibrate_consumes_delta() {
        let set: CandidateSet = vec![candidate(0.0, 0.9)].into_iter().collect();
        let calibrated = set.calibrate(false);
        let c = calibrated.as_slice()[0];
        // w = 9 - 0 + 1 = 10, shift by 0.1 * 10 on both x edges
        assert_relative_eq!(c.bbox.x1, 1.0);
        assert_relative_eq!(c.bbox.x2, 10.0);
        assert_eq!(c.delta, RegressionDelta::ZERO);
        assert_relative_eq!(c.score, 0.9);
    }

    #[test]
    fn test_normalized_boxes() {
        let set: CandidateSet = vec![candidate(10.0, 0.9)].into_iter().collect();
        let boxes = set.normalized_boxes(100, 50);
        assert_relative_eq!(boxes[0][1], 0.1);
        assert_relative_eq!(boxes[0][2], 9.0 / 50.0);
    }

    #[test]
    fn test_face_detection_from_candidate() {
        let c = candidate(0.0, 0.95);
        let face = FaceDetection::from(c);
        assert_eq!(face.bbox, c.bbox);
        assert!(face.landmarks.is_none());
    }
}
