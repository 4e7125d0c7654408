use super::errors::ConfigError;
use crate::shared::constants::PROPOSAL_CELL_SIZE;

/// A finite, restartable sequence of scale factors for one image size.
///
/// The image is first shrunk by `12 / min_face_size` so the Proposal cell
/// covers the smallest wanted face, then repeatedly by `scale_factor` until
/// the short side no longer fits a single cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalePyramid {
    base: f64,
    factor: f64,
    min_side: f64,
}

impl ScalePyramid {
    pub fn generate(
        height: usize,
        width: usize,
        min_face_size: f64,
        scale_factor: f64,
    ) -> Result<Self, ConfigError> {
        validate_scale_factor(scale_factor)?;
        validate_min_face_size(min_face_size)?;

        let base = PROPOSAL_CELL_SIZE / min_face_size;
        let min_side = height.min(width) as f64 * base;
        Ok(Self {
            base,
            factor: scale_factor,
            min_side,
        })
    }

    /// Iterate the scales, largest first. Each call starts over.
    pub fn iter(&self) -> Scales {
        Scales {
            base: self.base,
            factor: self.factor,
            min_side: self.min_side,
            step: 0,
        }
    }

    pub fn scales(&self) -> Vec<f64> {
        self.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.min_side <= PROPOSAL_CELL_SIZE
    }
}

impl IntoIterator for &ScalePyramid {
    type Item = f64;
    type IntoIter = Scales;

    fn into_iter(self) -> Scales {
        self.iter()
    }
}

/// Iterator over a [`ScalePyramid`].
#[derive(Clone, Debug)]
pub struct Scales {
    base: f64,
    factor: f64,
    min_side: f64,
    step: i32,
}

impl Scales {
    /// Scaled short side the next emitted scale corresponds to.
    pub fn min_side(&self) -> f64 {
        self.min_side
    }
}

impl Iterator for Scales {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.min_side <= PROPOSAL_CELL_SIZE {
            return None;
        }
        let scale = self.base * self.factor.powf(f64::from(self.step));
        self.min_side *= self.factor;
        self.step += 1;
        Some(scale)
    }
}

/// Pixel dimensions of the image after applying `scale` (rounded up).
pub fn scaled_dimensions(height: usize, width: usize, scale: f64) -> (usize, usize) {
    (
        (height as f64 * scale).ceil() as usize,
        (width as f64 * scale).ceil() as usize,
    )
}

pub(crate) fn validate_scale_factor(scale_factor: f64) -> Result<(), ConfigError> {
    if scale_factor.is_finite() && scale_factor > 0.0 && scale_factor < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::ScaleFactor(scale_factor))
    }
}

pub(crate) fn validate_min_face_size(min_face_size: f64) -> Result<(), ConfigError> {
    if min_face_size.is_finite() && min_face_size > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::MinFaceSize(min_face_size))
    }
}
