//! Shared fixtures for unit tests.

use crate::landmarks::{LandmarkError, LandmarkProvider};
use crate::types::{FaceLandmarks, Keypoint, Triangle, Uv};
use image::{Rgba, RgbaImage};
use std::sync::Arc;

pub const GRID_COLS: usize = 18;
pub const GRID_ROWS: usize = 26;

/// A 468-point closed grid "face" covering the middle 60% of a `width` x `height` image.
pub fn grid_face(width: f32, height: f32) -> FaceLandmarks {
    let mut keypoints = Vec::with_capacity(GRID_COLS * GRID_ROWS);
    let mut uv: Vec<Uv> = Vec::with_capacity(GRID_COLS * GRID_ROWS);
    for row in 0..GRID_ROWS {
        for col in 0..GRID_COLS {
            let u = col as f32 / (GRID_COLS - 1) as f32;
            let v = row as f32 / (GRID_ROWS - 1) as f32;
            // Shallow dome: centre closest to the camera.
            let z = -4.0 * (1.0 - ((u - 0.5).powi(2) + (v - 0.5).powi(2)));
            keypoints.push(Keypoint::new(
                width * (0.2 + 0.6 * u),
                height * (0.2 + 0.6 * v),
                z,
            ));
            uv.push([u, v]);
        }
    }

    let mut triangles: Vec<Triangle> = Vec::new();
    for row in 0..GRID_ROWS - 1 {
        for col in 0..GRID_COLS - 1 {
            let i = (row * GRID_COLS + col) as u32;
            let right = i + 1;
            let down = i + GRID_COLS as u32;
            triangles.push([i, down, right]);
            triangles.push([right, down, down + 1]);
        }
    }

    FaceLandmarks {
        keypoints,
        triangulation: triangles.into(),
        uv: uv.into(),
    }
}

pub fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

/// Provider returning canned detections.
pub struct StaticProvider {
    pub ready: bool,
    topology: FaceLandmarks,
    faces: Vec<Vec<Keypoint>>,
}

impl StaticProvider {
    pub fn new(topology: FaceLandmarks, faces: Vec<Vec<Keypoint>>) -> Self {
        Self {
            ready: true,
            topology,
            faces,
        }
    }
}

impl LandmarkProvider for StaticProvider {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn detect(&mut self, _image: &RgbaImage) -> Result<Vec<Vec<Keypoint>>, LandmarkError> {
        Ok(self.faces.clone())
    }

    fn triangulation(&self) -> Arc<[Triangle]> {
        self.topology.triangulation.clone()
    }

    fn uv_coords(&self) -> Arc<[Uv]> {
        self.topology.uv.clone()
    }
}
