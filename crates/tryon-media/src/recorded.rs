//! Landmark provider backed by a recorded detection dump.
//!
//! The dump is JSON produced by running a face mesh model offline:
//!
//! ```json
//! { "width": 640, "height": 480,
//!   "triangles": [[0, 1, 2], ...],
//!   "uv": [[0.5, 0.1], ...],
//!   "faces": [ { "keypoints": [ { "x": 320.0, "y": 96.5, "z": -12.0 }, ... ] } ] }
//! ```
//!
//! Keypoints are in the pixel space of the recorded frame and are rescaled
//! to whatever image `detect` is called with.

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tryon_core::landmarks::validate_topology;
use tryon_core::{Keypoint, LandmarkError, LandmarkProvider, Triangle, Uv};

#[derive(Error, Debug)]
pub enum RecordingError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed landmark recording: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("recorded frame size must be non-zero, got {width}x{height}")]
    InvalidSize { width: u32, height: u32 },
    #[error("face {face}: {source}")]
    Topology {
        face: usize,
        #[source]
        source: LandmarkError,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordingFile {
    width: u32,
    height: u32,
    triangles: Vec<Triangle>,
    uv: Vec<Uv>,
    #[serde(default)]
    faces: Vec<RecordedFace>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordedFace {
    keypoints: Vec<Keypoint>,
}

/// Replays recorded detections for any image.
#[derive(Debug, Clone)]
pub struct RecordedLandmarks {
    width: u32,
    height: u32,
    triangles: Arc<[Triangle]>,
    uv: Arc<[Uv]>,
    faces: Vec<Vec<Keypoint>>,
}

impl RecordedLandmarks {
    pub fn load(path: &Path) -> Result<Self, RecordingError> {
        let text = std::fs::read_to_string(path).map_err(|source| RecordingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let recording = Self::from_json(&text)?;
        tracing::info!(
            path = %path.display(),
            faces = recording.faces.len(),
            triangles = recording.triangles.len(),
            "landmark recording loaded"
        );
        Ok(recording)
    }

    /// Parse and validate a recording.
    pub fn from_json(text: &str) -> Result<Self, RecordingError> {
        let file: RecordingFile = serde_json::from_str(text)?;
        if file.width == 0 || file.height == 0 {
            return Err(RecordingError::InvalidSize {
                width: file.width,
                height: file.height,
            });
        }
        for (face, f) in file.faces.iter().enumerate() {
            validate_topology(f.keypoints.len(), &file.triangles, &file.uv)
                .map_err(|source| RecordingError::Topology { face, source })?;
        }

        Ok(Self {
            width: file.width,
            height: file.height,
            triangles: file.triangles.into(),
            uv: file.uv.into(),
            faces: file.faces.into_iter().map(|f| f.keypoints).collect(),
        })
    }

    /// Frame size the keypoints were recorded at.
    pub fn recorded_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }
}

impl LandmarkProvider for RecordedLandmarks {
    fn is_ready(&self) -> bool {
        true
    }

    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<Vec<Keypoint>>, LandmarkError> {
        let sx = image.width() as f32 / self.width as f32;
        let sy = image.height() as f32 / self.height as f32;
        if (sx - sy).abs() > 0.01 {
            tracing::debug!(sx, sy, "recording aspect differs from image; scaling axes independently");
        }
        // Relative depth follows the horizontal scale.
        Ok(self
            .faces
            .iter()
            .map(|face| {
                face.iter()
                    .map(|k| Keypoint::new(k.x * sx, k.y * sy, k.z * sx))
                    .collect()
            })
            .collect())
    }

    fn triangulation(&self) -> Arc<[Triangle]> {
        self.triangles.clone()
    }

    fn uv_coords(&self) -> Arc<[Uv]> {
        self.uv.clone()
    }
}
