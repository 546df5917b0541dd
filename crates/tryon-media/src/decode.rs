//! Asynchronous image decode.
//!
//! Decoding runs on the blocking pool so a large photo never stalls the
//! frame loop. Results land either in the awaiting caller or, for the
//! background photo, in a [`PendingImage`] the render session polls.

use image::RgbaImage;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tryon_core::PendingImage;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported or corrupt image: {0}")]
    Format(#[from] image::ImageError),
    #[error("image has zero size")]
    Empty,
    #[error("decode timed out after {0:?}")]
    TimedOut(Duration),
    #[error("decode task failed: {0}")]
    Join(String),
}

/// Where encoded image bytes come from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::Path(p) => write!(f, "{}", p.display()),
            ImageSource::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::Path(path)
    }
}

/// Decode on the current thread into straight-alpha RGBA.
pub fn decode_blocking(source: &ImageSource) -> Result<RgbaImage, DecodeError> {
    let decoded = match source {
        ImageSource::Path(path) => {
            let bytes = std::fs::read(path).map_err(|source| DecodeError::Io {
                path: path.clone(),
                source,
            })?;
            image::load_from_memory(&bytes)?
        }
        ImageSource::Bytes(bytes) => image::load_from_memory(bytes)?,
    };

    let rgba = decoded.into_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(DecodeError::Empty);
    }
    Ok(rgba)
}

/// Decode on the blocking pool, giving up after `timeout`.
pub async fn decode(source: ImageSource, timeout: Duration) -> Result<RgbaImage, DecodeError> {
    let label = source.to_string();
    let image = run_bounded(timeout, move || decode_blocking(&source)).await?;
    tracing::debug!(source = %label, width = image.width(), height = image.height(), "image decoded");
    Ok(image)
}

async fn run_bounded<T, F>(timeout: Duration, work: F) -> Result<T, DecodeError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DecodeError> + Send + 'static,
{
    let task = tokio::task::spawn_blocking(work);
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(DecodeError::Join(join.to_string())),
        Err(_) => Err(DecodeError::TimedOut(timeout)),
    }
}

/// Start decoding into `slot` without waiting for it.
pub fn spawn_decode(source: ImageSource, slot: PendingImage, timeout: Duration) -> JoinHandle<Result<(), DecodeError>> {
    tokio::spawn(async move {
        let image = decode(source, timeout).await?;
        if !slot.fill(image) {
            tracing::debug!("image slot already filled; dropping duplicate decode");
        }
        Ok(())
    })
}
