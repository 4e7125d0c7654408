use std::path::Path;

use image::{Rgb, RgbImage};

use crate::shared::bounding_box::BoundingBox;

/// Fill colour of the face boxes.
const OVERLAY_COLOR: [f32; 3] = [0.0, 204.0, 51.0];
const OVERLAY_ALPHA: f32 = 0.4;

/// Saves a copy of the input with every detected face shaded.
pub trait OverlayWriter: Send {
    fn write_overlay(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
        path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

/// Shades faces with a translucent green fill. Overlapping boxes are
/// shaded once.
pub struct BoxOverlayWriter;

impl BoxOverlayWriter {
    pub fn new() -> Self {
        Self
    }
}

impl Default for BoxOverlayWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl OverlayWriter for BoxOverlayWriter {
    fn write_overlay(
        &self,
        image: &RgbImage,
        boxes: &[BoundingBox],
        path: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        shade(image, boxes).save(path)?;
        Ok(())
    }
}

fn shade(image: &RgbImage, boxes: &[BoundingBox]) -> RgbImage {
    let mut out = image.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let (px, py) = (x as f32 + 0.5, y as f32 + 0.5);
        let covered = boxes
            .iter()
            .any(|b| px >= b.x1 && px < b.x2 && py >= b.y1 && py < b.y2);
        if covered {
            *pixel = blend(pixel);
        }
    }
    out
}

fn blend(pixel: &Rgb<u8>) -> Rgb<u8> {
    let mix = |c: usize| {
        let v = pixel[c] as f32 * (1.0 - OVERLAY_ALPHA) + OVERLAY_COLOR[c] * OVERLAY_ALPHA;
        v.round().clamp(0.0, 255.0) as u8
    };
    Rgb([mix(0), mix(1), mix(2)])
}
