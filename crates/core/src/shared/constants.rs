pub const PROPOSAL_MODEL_NAME: &str = "pnet.onnx";
pub const REFINE_MODEL_NAME: &str = "rnet.onnx";
pub const OUTPUT_MODEL_NAME: &str = "onet.onnx";

/// Patch edge the Proposal network sees per output cell.
pub const PROPOSAL_CELL_SIZE: f64 = 12.0;

/// Output-map stride of the Proposal network.
pub const PROPOSAL_STRIDE: f64 = 2.0;

pub const REFINE_PATCH_SIZE: usize = 24;
pub const OUTPUT_PATCH_SIZE: usize = 48;

/// Edge length of exported face crops (FaceNet input size).
pub const DEFAULT_CROP_SIZE: u32 = 160;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
