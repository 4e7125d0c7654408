use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::constants::{OUTPUT_MODEL_NAME, PROPOSAL_MODEL_NAME, REFINE_MODEL_NAME};

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
    #[error("model {name} not found (searched {searched:?}); pass a model directory or a download URL")]
    Missing { name: String, searched: Vec<PathBuf> },
}

/// Progress callback: `(bytes_downloaded, total_bytes)`.
/// `total_bytes` is 0 if the server didn't provide Content-Length.
pub type ProgressFn = Box<dyn Fn(u64, u64) + Send>;

/// Model files of the three cascade stages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CascadeModelPaths {
    pub proposal: PathBuf,
    pub refine: PathBuf,
    pub output: PathBuf,
}

/// Where to look for the cascade models.
#[derive(Clone, Copy, Debug, Default)]
pub struct ModelSources<'a> {
    /// Explicit directory, searched first.
    pub dir: Option<&'a Path>,
    /// Base URL the files are fetched from when neither the explicit
    /// directory nor the cache has them; `<base>/<file name>`.
    pub base_url: Option<&'a str>,
}

/// Resolve all three cascade models, see [`resolve`].
pub fn resolve_cascade(
    sources: ModelSources<'_>,
    progress: Option<&ProgressFn>,
) -> Result<CascadeModelPaths, ModelResolveError> {
    Ok(CascadeModelPaths {
        proposal: resolve(PROPOSAL_MODEL_NAME, sources, progress)?,
        refine: resolve(REFINE_MODEL_NAME, sources, progress)?,
        output: resolve(OUTPUT_MODEL_NAME, sources, progress)?,
    })
}

/// Resolve a model file by name.
///
/// Resolution order:
/// 1. Explicit model directory
/// 2. User cache directory (platform-specific)
/// 3. Download from `<base_url>/<name>` into the cache
pub fn resolve(
    name: &str,
    sources: ModelSources<'_>,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let cache_dir = model_cache_dir();
    if let Err(e) = &cache_dir {
        log::debug!("No model cache: {e}");
    }
    resolve_in(name, sources, cache_dir.ok().as_deref(), progress)
}

fn resolve_in(
    name: &str,
    sources: ModelSources<'_>,
    cache_dir: Option<&Path>,
    progress: Option<&ProgressFn>,
) -> Result<PathBuf, ModelResolveError> {
    let mut searched = Vec::new();
    for dir in [sources.dir, cache_dir].into_iter().flatten() {
        let path = dir.join(name);
        if path.is_file() {
            log::info!("Using model {}", path.display());
            return Ok(path);
        }
        searched.push(path);
    }

    let Some(base_url) = sources.base_url else {
        return Err(ModelResolveError::Missing {
            name: name.to_string(),
            searched,
        });
    };
    let cache_dir = cache_dir.ok_or(ModelResolveError::NoCacheDir)?;
    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;

    let url = model_url(base_url, name);
    let dest = cache_dir.join(name);
    log::info!("Downloading {url} to {}", dest.display());
    download(&url, &dest, progress)?;
    Ok(dest)
}

fn model_url(base_url: &str, name: &str) -> String {
    format!("{}/{name}", base_url.trim_end_matches('/'))
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/facecascade/models/`
/// - Linux: `$XDG_CACHE_HOME/facecascade/models/` or `~/.cache/facecascade/models/`
/// - Windows: `%LOCALAPPDATA%/facecascade/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("facecascade").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("facecascade").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path, progress: Option<&ProgressFn>) -> Result<(), ModelResolveError> {
    let temp_path = dest.with_extension("part");

    let result = download_inner(url, dest, &temp_path, progress);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn download_inner(
    url: &str,
    dest: &Path,
    temp_path: &Path,
    progress: Option<&ProgressFn>,
) -> Result<(), ModelResolveError> {
    let mut response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(|e| ModelResolveError::Download {
            url: url.to_string(),
            source: e,
        })?;

    let total = response.content_length().unwrap_or(0);
    let mut downloaded: u64 = 0;

    let write_error = |e| ModelResolveError::Write {
        path: temp_path.to_path_buf(),
        source: e,
    };
    let mut file = fs::File::create(temp_path).map_err(write_error)?;

    let mut buf = vec![0u8; 256 * 1024];
    loop {
        let n = response.read(&mut buf).map_err(write_error)?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).map_err(write_error)?;
        downloaded += n as u64;
        if let Some(cb) = progress {
            cb(downloaded, total);
        }
    }
    file.flush().map_err(write_error)?;
    drop(file);

    fs::rename(temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}
