use std::path::Path;

use super::image_reader::{ImageReadError, ImageReader};

/// Decodes image files with the `image` crate.
///
/// The format is sniffed from the file contents, so a mislabeled extension
/// still decodes. Alpha and 16-bit channels are dropped to 8-bit RGB.
pub struct ImageFileReader;

impl ImageFileReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ImageFileReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageReader for ImageFileReader {
    fn read(&self, path: &Path) -> Result<image::RgbImage, ImageReadError> {
        let open_error = |source| ImageReadError::Open {
            path: path.to_path_buf(),
            source,
        };
        let decoded = image::ImageReader::open(path)
            .map_err(open_error)?
            .with_guessed_format()
            .map_err(open_error)?
            .decode()
            .map_err(|source| ImageReadError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let rgb = decoded.to_rgb8();
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(ImageReadError::Empty {
                path: path.to_path_buf(),
            });
        }
        log::debug!("Read {} ({}x{})", path.display(), rgb.width(), rgb.height());
        Ok(rgb)
    }
}
