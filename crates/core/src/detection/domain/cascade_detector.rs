//! The three-stage cascade.
//!
//! ```text
//! pyramid ─► per scale: resize → Proposal → decode → NMS ─► concat → NMS
//!         ─► calibrate+square → crop 24x24 → Refine → filter → NMS
//!         ─► calibrate+square → crop 48x48 → Output → filter → calibrate → NMS
//! ```
//!
//! Refine and Output crops are always taken from the original image, never
//! from a pyramid level.

use std::sync::Arc;
use std::time::Instant;

use super::candidate::{CandidateSet, FaceDetection};
use super::candidate_generator;
use super::cascade_config::CascadeConfig;
use super::cascade_stats::{CascadeState, CascadeStats};
use super::errors::{ConfigError, DetectError, ModelError};
use super::image_transform::ImageTransform;
use super::non_max_suppressor::suppress;
use super::proposal_executor::{ProposalExecutor, SequentialProposalExecutor};
use super::scale_pyramid::{scaled_dimensions, ScalePyramid};
use super::scoring_stage::{CascadeStages, StageKind};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{OUTPUT_PATCH_SIZE, REFINE_PATCH_SIZE};
use crate::shared::image_tensor::ImageTensor;

/// Public entry point: detect faces in one image.
///
/// Holds no per-image state, so one detector can serve concurrent calls.
pub struct CascadeDetector {
    config: CascadeConfig,
    stages: CascadeStages,
    transform: Arc<dyn ImageTransform>,
    executor: Box<dyn ProposalExecutor>,
}

impl CascadeDetector {
    /// Validates `config` up front; detection itself never fails on config.
    pub fn new(
        config: CascadeConfig,
        stages: CascadeStages,
        transform: Arc<dyn ImageTransform>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            stages,
            transform,
            executor: Box::new(SequentialProposalExecutor),
        })
    }

    /// Replace the default sequential per-scale executor.
    pub fn with_executor(mut self, executor: Box<dyn ProposalExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Final face boxes; empty when nothing survives the cascade.
    pub fn detect(&self, image: &ImageTensor) -> Result<Vec<BoundingBox>, DetectError> {
        Ok(self
            .detect_faces(image)?
            .into_iter()
            .map(|face| face.bbox)
            .collect())
    }

    /// Like [`Self::detect`], keeping scores and landmarks.
    pub fn detect_faces(&self, image: &ImageTensor) -> Result<Vec<FaceDetection>, DetectError> {
        self.detect_with_stats(image).map(|(faces, _)| faces)
    }

    pub fn detect_with_stats(
        &self,
        image: &ImageTensor,
    ) -> Result<(Vec<FaceDetection>, CascadeStats), DetectError> {
        let config = &self.config;
        let pyramid = ScalePyramid::generate(
            image.height(),
            image.width(),
            config.min_face_size,
            config.scale_factor,
        )?;
        let scales = pyramid.scales();
        let mut stats = CascadeStats::new(scales.len());

        let started = Instant::now();
        let proposals = self.propose(image, &scales)?;
        stats.record_timing(StageKind::Proposal, started.elapsed());
        if !stats.advance(CascadeState::Stage1, proposals.len()) {
            return Ok(empty(stats));
        }
        let proposals = suppress(&proposals, config.nms.cross_scale);
        if !stats.advance(CascadeState::Stage1Nms, proposals.len()) {
            return Ok(empty(stats));
        }

        let started = Instant::now();
        let refined = self.rescore(
            image,
            StageKind::Refine,
            REFINE_PATCH_SIZE,
            proposals.calibrate(true),
        )?;
        stats.record_timing(StageKind::Refine, started.elapsed());
        if !stats.advance(CascadeState::Stage2, refined.len()) {
            return Ok(empty(stats));
        }
        let refined = suppress(&refined, config.nms.refine);
        if !stats.advance(CascadeState::Stage2Nms, refined.len()) {
            return Ok(empty(stats));
        }

        let started = Instant::now();
        let outputs = self.rescore(
            image,
            StageKind::Output,
            OUTPUT_PATCH_SIZE,
            refined.calibrate(true),
        )?;
        stats.record_timing(StageKind::Output, started.elapsed());
        if !stats.advance(CascadeState::Stage3, outputs.len()) {
            return Ok(empty(stats));
        }
        // Deltas are spent by this calibration; the last pass only weighs box and score.
        let faces = suppress(&outputs.calibrate(false), config.nms.output);
        stats.advance(CascadeState::Stage3Nms, faces.len());
        stats.finish();

        for face in &faces {
            if !face.bbox.is_well_formed() {
                log::warn!("cascade produced an inverted box: {:?}", face.bbox);
            }
        }

        Ok((faces.into_iter().map(FaceDetection::from).collect(), stats))
    }

    /// Stage 1 over every scale, concatenated in pyramid order.
    fn propose(&self, image: &ImageTensor, scales: &[f64]) -> Result<CandidateSet, ModelError> {
        let job = |index: usize, scale: f64| self.propose_at_scale(image, index, scale);
        let per_scale = self.executor.run(scales, &job)?;

        let mut all = CandidateSet::with_capacity(per_scale.iter().map(CandidateSet::len).sum());
        for candidates in per_scale {
            all.append(candidates);
        }
        Ok(all)
    }

    fn propose_at_scale(
        &self,
        image: &ImageTensor,
        index: usize,
        scale: f64,
    ) -> Result<CandidateSet, ModelError> {
        let (height, width) = scaled_dimensions(image.height(), image.width(), scale);
        let batch = self.transform.resize(image, height, width)?;
        let output = self.stages.proposal.score(batch.view())?;
        let (regression, scores) = output.proposal_maps()?;

        let threshold = self.config.score_threshold(StageKind::Proposal);
        let candidates = candidate_generator::generate(scores, regression, scale, threshold);
        let kept = suppress(&candidates, self.config.nms.per_scale);
        log::trace!(
            "scale {index} ({scale:.4}, {width}x{height}): {} -> {} candidates",
            candidates.len(),
            kept.len()
        );
        Ok(kept)
    }

    /// Crop every candidate from the original image, score the patches with
    /// `stage` and keep the rows above that stage's threshold.
    fn rescore(
        &self,
        image: &ImageTensor,
        stage: StageKind,
        patch_size: usize,
        candidates: CandidateSet,
    ) -> Result<CandidateSet, ModelError> {
        let boxes = candidates.normalized_boxes(image.width(), image.height());
        let batch = self
            .transform
            .crop_and_resize(image, &boxes, patch_size, patch_size)?;
        if batch.shape()[0] != candidates.len() {
            return Err(ModelError::Transform(format!(
                "crop_and_resize returned {} patches for {} boxes",
                batch.shape()[0],
                candidates.len()
            )));
        }

        let output = self.stages.get(stage).score(batch.view())?;
        let rows = output.patch_rows(stage, candidates.len())?;
        Ok(candidate_generator::filter(
            &candidates,
            &rows,
            self.config.score_threshold(stage),
        ))
    }
}

fn empty(mut stats: CascadeStats) -> (Vec<FaceDetection>, CascadeStats) {
    stats.finish();
    (Vec::new(), stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::scoring_stage::ScoringStage;
    use crate::detection::test_support::{
        stages, FailingStage, PatchStage, ProposalStage, RecordingTransform, TransformFault,
    };
    use rstest::rstest;
    use approx::assert_relative_eq;

    fn image() -> ImageTensor {
        ImageTensor::filled(100, 100, 128.0)
    }

    struct Fixture {
        proposal: Arc<ProposalStage>,
        refine: Arc<PatchStage>,
        output: Arc<PatchStage>,
        transform: Arc<RecordingTransform>,
    }

    impl Fixture {
        /// One hot Proposal cell at (5, 5) on the 60x60 level (scale 0.6).
        fn single_face() -> Self {
            Self {
                proposal: Arc::new(ProposalStage::hot_at(60, &[(5, 5)])),
                refine: Arc::new(PatchStage::scoring(0.9)),
                output: Arc::new(PatchStage::scoring(0.95)),
                transform: Arc::new(RecordingTransform::default()),
            }
        }

        fn detector(&self) -> CascadeDetector {
            self.detector_with(CascadeConfig::default())
        }

        fn detector_with(&self, config: CascadeConfig) -> CascadeDetector {
            CascadeDetector::new(
                config,
                stages(
                    self.proposal.clone(),
                    self.refine.clone(),
                    self.output.clone(),
                ),
                self.transform.clone(),
            )
            .unwrap()
        }
    }

    #[test]
    fn test_below_threshold_everywhere_short_circuits() {
        let fx = Fixture {
            proposal: Arc::new(ProposalStage::cold()),
            ..Fixture::single_face()
        };

        let (faces, stats) = fx.detector().detect_with_stats(&image()).unwrap();

        assert!(faces.is_empty());
        assert_eq!(fx.proposal.calls(), 5);
        assert_eq!(fx.refine.calls(), 0);
        assert_eq!(fx.output.calls(), 0);
        assert_eq!(fx.transform.crop_calls(), 0);
        assert_eq!(stats.state(), CascadeState::Empty);
        assert_eq!(stats.count(CascadeState::Stage1), Some(0));
    }

    #[test]
    fn test_single_face_flows_through_all_stages() {
        let fx = Fixture::single_face();

        let boxes = fx.detector().detect(&image()).unwrap();

        // cell (5, 5) at scale 0.6: floor(11 / 0.6 + 0.5) = 18, floor(23 / 0.6 + 0.5) = 38
        assert_eq!(boxes, vec![BoundingBox::new(18.0, 18.0, 38.0, 38.0)]);
        assert_eq!(fx.proposal.calls(), 5);
        assert_eq!(fx.refine.calls(), 1);
        assert_eq!(fx.output.calls(), 1);
    }

    #[test]
    fn test_crops_use_original_image_coordinates() {
        let fx = Fixture::single_face();
        fx.detector().detect(&image()).unwrap();

        let crops = fx.transform.crops();
        assert_eq!(crops.len(), 2);
        assert_eq!(crops[0].1, (24, 24));
        assert_eq!(crops[1].1, (48, 48));
        let b = crops[0].0[0];
        assert_relative_eq!(b[0], 0.18);
        assert_relative_eq!(b[1], 0.18);
        assert_relative_eq!(b[2], 0.38);
        assert_relative_eq!(b[3], 0.38);
    }

    #[test]
    fn test_resize_follows_pyramid() {
        let fx = Fixture::single_face();
        fx.detector().detect(&image()).unwrap();
        // 100 * [0.6, 0.4254, 0.3016, 0.2138, 0.1516], rounded up
        assert_eq!(fx.transform.resizes(), vec![(60, 60), (43, 43), (31, 31), (22, 22), (16, 16)]);
    }

    #[test]
    fn test_refine_rejects_everything() {
        let fx = Fixture {
            refine: Arc::new(PatchStage::scoring(0.5)),
            ..Fixture::single_face()
        };

        let (faces, stats) = fx.detector().detect_with_stats(&image()).unwrap();

        assert!(faces.is_empty());
        assert_eq!(fx.refine.calls(), 1);
        assert_eq!(fx.output.calls(), 0);
        assert_eq!(stats.count(CascadeState::Stage2), Some(0));
        assert_eq!(stats.state(), CascadeState::Empty);
    }

    #[test]
    fn test_output_stage_calibration_is_not_squared() {
        let fx = Fixture {
            output: Arc::new(PatchStage::scoring(0.95).with_regression([0.0, 0.0, 0.5, 0.0])),
            ..Fixture::single_face()
        };

        let boxes = fx.detector().detect(&image()).unwrap();

        // w = 38 - 18 + 1 = 21, x2 grows by 10.5
        assert_eq!(boxes, vec![BoundingBox::new(18.0, 18.0, 48.5, 38.0)]);
    }

    #[test]
    fn test_landmarks_are_decoded_against_output_input_box() {
        let fx = Fixture {
            output: Arc::new(PatchStage::scoring(0.95).with_landmarks([0.5; 10])),
            ..Fixture::single_face()
        };

        let faces = fx.detector().detect_faces(&image()).unwrap();

        let lm = faces[0].landmarks.unwrap();
        assert_relative_eq!(lm[0].0, 28.5);
        assert_relative_eq!(lm[4].1, 28.5);
        assert_relative_eq!(faces[0].score, 0.95);
    }

    #[test]
    fn test_stats_cover_every_state() {
        let fx = Fixture::single_face();
        let (_, stats) = fx.detector().detect_with_stats(&image()).unwrap();

        assert_eq!(stats.state(), CascadeState::Done);
        assert_eq!(stats.scales(), 5);
        for state in [
            CascadeState::Stage1,
            CascadeState::Stage1Nms,
            CascadeState::Stage2,
            CascadeState::Stage2Nms,
            CascadeState::Stage3,
            CascadeState::Stage3Nms,
        ] {
            assert_eq!(stats.count(state), Some(1), "{state}");
        }
    }

    #[test]
    fn test_duplicate_proposals_collapse() {
        // Neighbouring cells give heavily overlapping 20x20 boxes.
        let fx = Fixture {
            proposal: Arc::new(ProposalStage::hot_at(60, &[(5, 5), (5, 6), (6, 5)])),
            ..Fixture::single_face()
        };

        let (faces, stats) = fx.detector().detect_with_stats(&image()).unwrap();

        assert_eq!(stats.count(CascadeState::Stage1), Some(1));
        assert_eq!(faces.len(), 1);
    }

    #[test]
    fn test_proposal_failure_is_fatal() {
        let proposal: Arc<dyn ScoringStage> = Arc::new(FailingStage(StageKind::Proposal));
        let fx = Fixture::single_face();
        let detector = CascadeDetector::new(
            CascadeConfig::default(),
            CascadeStages::new(proposal, fx.refine.clone(), fx.output.clone()),
            fx.transform.clone(),
        )
        .unwrap();

        let err = detector.detect(&image()).unwrap_err();

        assert!(matches!(
            err,
            DetectError::Model(ModelError::Inference {
                stage: StageKind::Proposal,
                ..
            })
        ));
        assert_eq!(fx.refine.calls(), 0);
    }

    #[rstest]
    #[case::resize(TransformFault::Resize)]
    #[case::crop(TransformFault::Crop)]
    #[case::missing_patch(TransformFault::DropPatch)]
    fn test_transform_failure_is_fatal(#[case] fault: TransformFault) {
        let fx = Fixture {
            transform: Arc::new(RecordingTransform::failing(fault)),
            ..Fixture::single_face()
        };

        let err = fx.detector().detect(&image()).unwrap_err();

        assert!(matches!(err, DetectError::Model(ModelError::Transform(_))));
        assert_eq!(fx.refine.calls(), 0);
        assert_eq!(fx.output.calls(), 0);
    }

    #[test]
    fn test_resize_failure_stops_before_scoring() {
        let fx = Fixture {
            transform: Arc::new(RecordingTransform::failing(TransformFault::Resize)),
            ..Fixture::single_face()
        };

        assert!(fx.detector().detect(&image()).is_err());
        assert_eq!(fx.transform.resizes().len(), 1);
        assert_eq!(fx.proposal.calls(), 0);
        assert_eq!(fx.transform.crop_calls(), 0);
    }

    #[test]
    fn test_refine_failure_skips_output_stage() {
        let refine: Arc<dyn ScoringStage> = Arc::new(FailingStage(StageKind::Refine));
        let fx = Fixture::single_face();
        let detector = CascadeDetector::new(
            CascadeConfig::default(),
            CascadeStages::new(fx.proposal.clone(), refine, fx.output.clone()),
            fx.transform.clone(),
        )
        .unwrap();

        let err = detector.detect_faces(&image()).unwrap_err();

        assert!(matches!(
            err,
            DetectError::Model(ModelError::Inference {
                stage: StageKind::Refine,
                ..
            })
        ));
        assert_eq!(fx.transform.crop_calls(), 1);
        assert_eq!(fx.output.calls(), 0);
    }

    #[test]
    fn test_output_failure_returns_no_partial_result() {
        let output: Arc<dyn ScoringStage> = Arc::new(FailingStage(StageKind::Output));
        let fx = Fixture::single_face();
        let detector = CascadeDetector::new(
            CascadeConfig::default(),
            CascadeStages::new(fx.proposal.clone(), fx.refine.clone(), output),
            fx.transform.clone(),
        )
        .unwrap();

        let err = detector.detect_with_stats(&image()).unwrap_err();

        assert!(matches!(
            err,
            DetectError::Model(ModelError::Inference {
                stage: StageKind::Output,
                ..
            })
        ));
        assert_eq!(fx.refine.calls(), 1);
    }

    #[test]
    fn test_output_batch_mismatch_is_a_model_error() {
        let fx = Fixture {
            output: Arc::new(PatchStage::scoring(0.95).with_fixed_batch(3)),
            ..Fixture::single_face()
        };

        let err = fx.detector().detect(&image()).unwrap_err();

        assert!(matches!(
            err,
            DetectError::Model(ModelError::OutputShape {
                stage: StageKind::Output,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let fx = Fixture::single_face();
        let result = CascadeDetector::new(
            CascadeConfig::default().with_scale_factor(1.0),
            stages(fx.proposal.clone(), fx.refine.clone(), fx.output.clone()),
            fx.transform.clone(),
        );
        assert!(matches!(result, Err(ConfigError::ScaleFactor(_))));
    }

    #[test]
    fn test_image_smaller_than_min_face_is_empty() {
        let fx = Fixture::single_face();
        let faces = fx.detector().detect(&ImageTensor::filled(15, 300, 0.0)).unwrap();
        assert!(faces.is_empty());
        assert_eq!(fx.proposal.calls(), 0);
    }

    #[test]
    fn test_repeated_calls_are_independent() {
        let fx = Fixture::single_face();
        let detector = fx.detector();
        let first = detector.detect(&image()).unwrap();
        let second = detector.detect(&image()).unwrap();
        assert_eq!(first, second);
    }
}
