use ndarray::{Array3, ArrayView3, ShapeError};

/// A decoded RGB image as an `H x W x 3` float tensor.
///
/// Pixel values are in `0.0..=255.0`, before any network normalization.
/// The cascade only ever reads from it, so one tensor can be shared by
/// concurrent proposal workers.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTensor {
    pixels: Array3<f32>,
}

impl ImageTensor {
    pub const CHANNELS: usize = 3;

    /// Build from row-major interleaved RGB floats.
    pub fn from_shape_vec(height: usize, width: usize, data: Vec<f32>) -> Result<Self, ShapeError> {
        let pixels = Array3::from_shape_vec((height, width, Self::CHANNELS), data)?;
        Ok(Self { pixels })
    }

    /// Constant-colour image, mostly useful for tests and warm-up runs.
    pub fn filled(height: usize, width: usize, value: f32) -> Self {
        Self {
            pixels: Array3::from_elem((height, width, Self::CHANNELS), value),
        }
    }

    pub fn from_rgb8(image: &image::RgbImage) -> Self {
        let (width, height) = image.dimensions();
        let pixels = Array3::from_shape_fn(
            (height as usize, width as usize, Self::CHANNELS),
            |(y, x, c)| image.get_pixel(x as u32, y as u32)[c] as f32,
        );
        Self { pixels }
    }

    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    pub fn view(&self) -> ArrayView3<'_, f32> {
        self.pixels.view()
    }
}
