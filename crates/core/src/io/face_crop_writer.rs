use std::path::{Path, PathBuf};

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::DEFAULT_CROP_SIZE;

/// Saves one image per detected face.
pub trait CropWriter: Send {
    /// Writes the crops of `boxes` into `dir` and returns the written paths,
    /// in box order.
    fn write_crops(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
        dir: &Path,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>>;
}

/// Crops faces at native resolution, resizes them to a square of
/// `crop_size` pixels and saves them as `face_<n>.png`.
pub struct FaceCropWriter {
    crop_size: u32,
}

impl FaceCropWriter {
    pub fn new(crop_size: u32) -> Self {
        Self { crop_size }
    }

    pub fn crop_size(&self) -> u32 {
        self.crop_size
    }
}

impl Default for FaceCropWriter {
    fn default() -> Self {
        Self::new(DEFAULT_CROP_SIZE)
    }
}

impl CropWriter for FaceCropWriter {
    fn write_crops(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
        dir: &Path,
    ) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(boxes.len());
        for (n, bbox) in boxes.iter().enumerate() {
            let Some((x, y, w, h)) = pixel_rect(bbox, image.width(), image.height()) else {
                log::warn!("Skipping face {n}: box {bbox:?} is outside the image");
                continue;
            };
            let crop = imageops::crop_imm(image, x, y, w, h).to_image();
            let resized = imageops::resize(&crop, self.crop_size, self.crop_size, FilterType::Triangle);

            let path = dir.join(format!("face_{n}.png"));
            resized.save(&path)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Integer pixel rectangle `(x, y, w, h)` covering `bbox`, clipped to the
/// image; `None` when nothing is left.
fn pixel_rect(bbox: &BoundingBox, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    let x1 = bbox.x1.floor().max(0.0) as u32;
    let y1 = bbox.y1.floor().max(0.0) as u32;
    let x2 = (bbox.x2.ceil().max(0.0) as u32).min(width);
    let y2 = (bbox.y2.ceil().max(0.0) as u32).min(height);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}
