//! Landmark provider boundary.
//!
//! Facial landmark detection is delegated to an external model. The core only
//! relies on the contract below: a fixed-size ordered keypoint set per face, a
//! fixed triangulation over it, and one UV pair per keypoint.

use crate::types::{FaceLandmarks, Keypoint, Notice, Notifier, Triangle, Uv};
use image::RgbaImage;
use std::sync::Arc;
use thiserror::Error;

// Canonical indices in the 468-point face mesh topology.
pub const FOREHEAD: usize = 10;
pub const LEFT_CHEEK: usize = 234;
pub const RIGHT_CHEEK: usize = 454;
pub const CHIN: usize = 152;
pub const NOSE_TIP: usize = 1;

/// The five landmarks sampled for light estimation, in sampling order.
pub const LIGHT_SAMPLE_LANDMARKS: [usize; 5] = [FOREHEAD, LEFT_CHEEK, RIGHT_CHEEK, CHIN, NOSE_TIP];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LandmarkError {
    #[error("landmark provider not initialized")]
    ProviderNotReady,
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detection failed: {0}")]
    DetectionFailed(String),
    #[error("triangle {triangle} references vertex {index}, but only {count} keypoints exist")]
    IndexOutOfRange {
        triangle: usize,
        index: u32,
        count: usize,
    },
    #[error("expected {expected} UV coordinates (one per keypoint), got {actual}")]
    UvCountMismatch { expected: usize, actual: usize },
}

/// External facial landmark detector.
pub trait LandmarkProvider {
    /// Whether the underlying model has finished loading.
    fn is_ready(&self) -> bool;

    /// Detect faces in `image`. Each entry is one face's ordered keypoints.
    fn detect(&mut self, image: &RgbaImage) -> Result<Vec<Vec<Keypoint>>, LandmarkError>;

    /// Fixed mesh connectivity, shared by every detection.
    fn triangulation(&self) -> Arc<[Triangle]>;

    /// Fixed texture coordinates, one per keypoint index.
    fn uv_coords(&self) -> Arc<[Uv]>;
}

/// Check that `triangles` and `uv` are consistent with a keypoint set of `count` points.
pub fn validate_topology(count: usize, triangles: &[Triangle], uv: &[Uv]) -> Result<(), LandmarkError> {
    if uv.len() != count {
        return Err(LandmarkError::UvCountMismatch {
            expected: count,
            actual: uv.len(),
        });
    }
    for (i, tri) in triangles.iter().enumerate() {
        if let Some(&index) = tri.iter().find(|&&idx| idx as usize >= count) {
            return Err(LandmarkError::IndexOutOfRange {
                triangle: i,
                index,
                count,
            });
        }
    }
    Ok(())
}

/// Run detection and pick the first face.
///
/// A provider that is still loading is skipped with a warning. An empty
/// result raises [`Notice::NoFaceDetected`] so nothing downstream starts.
pub fn detect_landmarks<P: LandmarkProvider + ?Sized>(
    provider: &mut P,
    image: &RgbaImage,
    notifier: &mut dyn Notifier,
) -> Result<FaceLandmarks, LandmarkError> {
    if !provider.is_ready() {
        tracing::warn!("landmark model not yet loaded; skipping detection");
        return Err(LandmarkError::ProviderNotReady);
    }

    let mut faces = provider.detect(image)?;
    tracing::debug!(faces = faces.len(), "landmark detection finished");

    if faces.is_empty() {
        notifier.notify(Notice::NoFaceDetected);
        return Err(LandmarkError::NoFaceDetected);
    }
    let keypoints = faces.swap_remove(0);

    let triangulation = provider.triangulation();
    let uv = provider.uv_coords();
    validate_topology(keypoints.len(), &triangulation, &uv)?;

    Ok(FaceLandmarks {
        keypoints,
        triangulation,
        uv,
    })
}
