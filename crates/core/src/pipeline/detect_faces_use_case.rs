use std::path::{Path, PathBuf};

use crate::detection::domain::candidate::FaceDetection;
use crate::detection::domain::cascade_detector::CascadeDetector;
use crate::detection::domain::cascade_stats::CascadeStats;
use crate::io::face_crop_writer::CropWriter;
use crate::io::image_reader::ImageReader;
use crate::io::overlay_writer::OverlayWriter;
use crate::shared::image_tensor::ImageTensor;

/// What one run of [`DetectFacesUseCase::execute`] found and wrote.
#[derive(Debug)]
pub struct DetectionReport {
    /// Faces with their boxes grown by the margin and clamped to the image.
    pub faces: Vec<FaceDetection>,
    pub stats: CascadeStats,
    pub width: u32,
    pub height: u32,
    pub crops: Vec<PathBuf>,
}

/// Single-image detection: read → detect → expand by margin → export.
pub struct DetectFacesUseCase {
    reader: Box<dyn ImageReader>,
    detector: CascadeDetector,
    margin: f32,
    crops: Option<(Box<dyn CropWriter>, PathBuf)>,
    overlay: Option<(Box<dyn OverlayWriter>, PathBuf)>,
}

impl DetectFacesUseCase {
    pub fn new(reader: Box<dyn ImageReader>, detector: CascadeDetector, margin: f32) -> Self {
        Self {
            reader,
            detector,
            margin,
            crops: None,
            overlay: None,
        }
    }

    /// Also save one crop per face into `dir`.
    pub fn with_crops(mut self, writer: Box<dyn CropWriter>, dir: PathBuf) -> Self {
        self.crops = Some((writer, dir));
        self
    }

    /// Also save the input with the faces shaded to `path`.
    pub fn with_overlay(mut self, writer: Box<dyn OverlayWriter>, path: PathBuf) -> Self {
        self.overlay = Some((writer, path));
        self
    }

    pub fn execute(&self, input_path: &Path) -> Result<DetectionReport, Box<dyn std::error::Error>> {
        let image = self.reader.read(input_path)?;
        let (width, height) = image.dimensions();

        let tensor = ImageTensor::from_rgb8(&image);
        let (faces, stats) = self.detector.detect_with_stats(&tensor)?;
        log::debug!("{}", stats.summary_string());

        let faces: Vec<FaceDetection> = faces
            .into_iter()
            .map(|face| FaceDetection {
                bbox: face
                    .bbox
                    .expanded(self.margin)
                    .clamped(width as f32, height as f32),
                ..face
            })
            .collect();
        let boxes: Vec<_> = faces.iter().map(|face| face.bbox).collect();

        let crops = match &self.crops {
            Some((writer, dir)) if !faces.is_empty() => writer.write_crops(&image, &boxes, dir)?,
            _ => Vec::new(),
        };
        if let Some((writer, path)) = &self.overlay {
            writer.write_overlay(&image, &boxes, path)?;
        }

        Ok(DetectionReport {
            faces,
            stats,
            width,
            height,
            crops,
        })
    }
}
