use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImageReadError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{path} has no pixels")]
    Empty { path: PathBuf },
}

/// Loads one still image as 8-bit RGB.
pub trait ImageReader: Send {
    fn read(&self, path: &Path) -> Result<image::RgbImage, ImageReadError>;
}
