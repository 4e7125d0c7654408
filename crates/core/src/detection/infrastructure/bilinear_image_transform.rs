use ndarray::{Array4, ArrayView3, Axis};

use crate::detection::domain::errors::ModelError;
use crate::detection::domain::image_transform::{normalize_pixel, ImageTransform};
use crate::shared::image_tensor::ImageTensor;

/// Value sampled for crop coordinates that fall outside the image.
const EXTRAPOLATION_VALUE: f32 = 0.0;

/// Bilinear [`ImageTransform`].
///
/// Both paths sample with the same 2-tap bilinear kernel and no
/// antialiasing, matching TensorFlow. `resize` follows `resize_bilinear`:
/// output pixel `i` reads source coordinate `i * in / out`. Box crops follow
/// `crop_and_resize`: the box corners map onto the first and last sample,
/// and out-of-image samples take [`EXTRAPOLATION_VALUE`] before
/// normalization.
#[derive(Clone, Copy, Debug, Default)]
pub struct BilinearImageTransform;

impl BilinearImageTransform {
    pub fn new() -> Self {
        Self
    }
}

impl ImageTransform for BilinearImageTransform {
    fn resize(
        &self,
        image: &ImageTensor,
        height: usize,
        width: usize,
    ) -> Result<Array4<f32>, ModelError> {
        if image.is_empty() || height == 0 || width == 0 {
            return Err(ModelError::Transform(format!(
                "cannot resize {}x{} image to {width}x{height}",
                image.width(),
                image.height()
            )));
        }

        let pixels = image.view();
        let ys: Vec<f32> = (0..height)
            .map(|y| resize_coordinate(y, height, image.height()))
            .collect();
        let xs: Vec<f32> = (0..width)
            .map(|x| resize_coordinate(x, width, image.width()))
            .collect();

        Ok(Array4::from_shape_fn(
            (1, height, width, ImageTensor::CHANNELS),
            |(_, y, x, c)| normalize_pixel(bilinear(&pixels, ys[y], xs[x], c)),
        ))
    }

    fn crop_and_resize(
        &self,
        image: &ImageTensor,
        boxes: &[[f32; 4]],
        height: usize,
        width: usize,
    ) -> Result<Array4<f32>, ModelError> {
        if height == 0 || width == 0 {
            return Err(ModelError::Transform(format!(
                "invalid crop size {width}x{height}"
            )));
        }

        let mut out = Array4::<f32>::zeros((boxes.len(), height, width, ImageTensor::CHANNELS));
        let pixels = image.view();
        for (mut patch, bbox) in out.axis_iter_mut(Axis(0)).zip(boxes) {
            for y in 0..height {
                let in_y = sample_coordinate(bbox[0], bbox[2], y, height, image.height());
                for x in 0..width {
                    let in_x = sample_coordinate(bbox[1], bbox[3], x, width, image.width());
                    for c in 0..ImageTensor::CHANNELS {
                        let value = match (in_y, in_x) {
                            (Some(in_y), Some(in_x)) => bilinear(&pixels, in_y, in_x, c),
                            _ => EXTRAPOLATION_VALUE,
                        };
                        patch[[y, x, c]] = normalize_pixel(value);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Source coordinate of resize output pixel `index`, clamped to the last
/// source pixel.
fn resize_coordinate(index: usize, samples: usize, extent: usize) -> f32 {
    let coord = index as f32 * extent as f32 / samples as f32;
    coord.min((extent - 1) as f32)
}

/// Source coordinate of output sample `index`, or `None` when it falls
/// outside `0..=extent - 1`.
fn sample_coordinate(start: f32, end: f32, index: usize, samples: usize, extent: usize) -> Option<f32> {
    if extent == 0 {
        return None;
    }
    let last = (extent - 1) as f32;
    let coord = if samples > 1 {
        start * last + index as f32 * (end - start) * last / (samples - 1) as f32
    } else {
        0.5 * (start + end) * last
    };
    (0.0..=last).contains(&coord).then_some(coord)
}

fn bilinear(pixels: &ArrayView3<'_, f32>, y: f32, x: f32, c: usize) -> f32 {
    let (top, bottom) = (y.floor() as usize, y.ceil() as usize);
    let (left, right) = (x.floor() as usize, x.ceil() as usize);
    let y_lerp = y - top as f32;
    let x_lerp = x - left as f32;

    let top_value = lerp(pixels[[top, left, c]], pixels[[top, right, c]], x_lerp);
    let bottom_value = lerp(pixels[[bottom, left, c]], pixels[[bottom, right, c]], x_lerp);
    lerp(top_value, bottom_value, y_lerp)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
