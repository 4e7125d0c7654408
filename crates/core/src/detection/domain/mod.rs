pub mod box_calibrator;
pub mod candidate;
pub mod candidate_generator;
pub mod cascade_config;
pub mod cascade_detector;
pub mod cascade_stats;
pub mod errors;
pub mod image_transform;
pub mod non_max_suppressor;
pub mod proposal_executor;
pub mod scale_pyramid;
pub mod scoring_stage;
