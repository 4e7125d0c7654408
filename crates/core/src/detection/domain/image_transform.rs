use ndarray::Array4;

use super::errors::ModelError;
use crate::shared::image_tensor::ImageTensor;

/// Subtracted from every 0..255 pixel before scoring.
pub const PIXEL_MEAN: f32 = 127.5;

/// Multiplier applied after mean subtraction (1/128).
pub const PIXEL_SCALE: f32 = 0.0078125;

/// Map a raw 0..255 pixel value into the networks' input range.
#[inline]
pub fn normalize_pixel(value: f32) -> f32 {
    (value - PIXEL_MEAN) * PIXEL_SCALE
}

/// Geometric resampling collaborator of the cascade.
///
/// Both operations return normalized batches (see [`normalize_pixel`]) in
/// `[N, H, W, 3]` row-major layout, ready for a
/// [`super::scoring_stage::ScoringStage`].
pub trait ImageTransform: Send + Sync {
    /// Resize the whole image to `height x width`; returns a batch of one.
    fn resize(&self, image: &ImageTensor, height: usize, width: usize)
        -> Result<Array4<f32>, ModelError>;

    /// Crop each normalized `(y1, x1, y2, x2)` box and resample it to
    /// `height x width`. Boxes may extend past the image border.
    fn crop_and_resize(
        &self,
        image: &ImageTensor,
        boxes: &[[f32; 4]],
        height: usize,
        width: usize,
    ) -> Result<Array4<f32>, ModelError>;
}
