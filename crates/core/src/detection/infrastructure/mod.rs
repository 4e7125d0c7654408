pub mod bilinear_image_transform;
pub mod execution_provider;
pub mod onnx_scoring_stage;
pub mod threaded_proposal_executor;
