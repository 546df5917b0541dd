//! Ambient light direction estimation.
//!
//! Samples photo brightness at five canonical landmarks and turns the
//! left/right and top/bottom differences into a smoothed 2-D vector that
//! drives the scene's key light.

use crate::landmarks::{CHIN, FOREHEAD, LEFT_CHEEK, LIGHT_SAMPLE_LANDMARKS, RIGHT_CHEEK};
use crate::types::Keypoint;
use image::RgbaImage;

const SMOOTHING_FACTOR: f32 = 0.1;
/// Gain from brightness difference to light offset on the unit sphere.
const DIRECTION_GAIN: f32 = 2.0;

/// Result of one sampling pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightEstimate {
    /// Smoothed horizontal component after this pass.
    pub light_x: f32,
    /// Smoothed vertical component (3-D up) after this pass.
    pub light_y: f32,
    /// Pixel coordinates sampled, in [`LIGHT_SAMPLE_LANDMARKS`] order.
    pub sampled_points: [(u32, u32); 5],
}

/// Per-session light state. Starts at zero; a new session gets a new estimator.
#[derive(Debug, Clone, Default)]
pub struct LightEstimator {
    smoothed: [f32; 2],
}

impl LightEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current smoothed (x, y).
    pub fn smoothed(&self) -> (f32, f32) {
        (self.smoothed[0], self.smoothed[1])
    }

    /// Unit direction toward the key light: `(x, y, 1)` normalized.
    pub fn direction(&self) -> [f32; 3] {
        let [x, y] = self.smoothed;
        let len = (x * x + y * y + 1.0).sqrt();
        [x / len, y / len, 1.0 / len]
    }

    /// Sample `source` at the canonical landmarks and advance the smoothed vector.
    ///
    /// `width` x `height` is the overlay size the keypoints were placed in.
    /// Returns `None` (state untouched) when the buffer is empty or not yet at
    /// that size, or the keypoint set lacks a canonical index.
    pub fn estimate(
        &mut self,
        source: &RgbaImage,
        keypoints: &[Keypoint],
        width: u32,
        height: u32,
    ) -> Option<LightEstimate> {
        if source.width() == 0 || source.height() == 0 {
            return None;
        }
        if source.dimensions() != (width, height) {
            tracing::trace!(
                buffer_width = source.width(),
                buffer_height = source.height(),
                width,
                height,
                "light sample skipped: buffer size mismatch"
            );
            return None;
        }

        let mut sampled_points = [(0u32, 0u32); 5];
        let mut brightness = [0.0f32; 5];
        for (slot, &landmark) in LIGHT_SAMPLE_LANDMARKS.iter().enumerate() {
            let kp = keypoints.get(landmark)?;
            let px = clamp_coord(kp.x, source.width());
            let py = clamp_coord(kp.y, source.height());
            sampled_points[slot] = (px, py);
            brightness[slot] = luminance(source, px, py);
        }

        let of = |landmark: usize| {
            LIGHT_SAMPLE_LANDMARKS
                .iter()
                .position(|&l| l == landmark)
                .map(|slot| brightness[slot])
                .unwrap_or(0.0)
        };
        let raw_x = (of(RIGHT_CHEEK) - of(LEFT_CHEEK)).clamp(-1.0, 1.0);
        let raw_y = (of(FOREHEAD) - of(CHIN)).clamp(-1.0, 1.0);

        // Image x grows toward the subject's left; flip so the light sits on
        // the brighter side in 3-D.
        self.step([-raw_x * DIRECTION_GAIN, raw_y * DIRECTION_GAIN]);

        tracing::trace!(raw_x, raw_y, light_x = self.smoothed[0], light_y = self.smoothed[1], "light sample");

        Some(LightEstimate {
            light_x: self.smoothed[0],
            light_y: self.smoothed[1],
            sampled_points,
        })
    }

    fn step(&mut self, target: [f32; 2]) {
        for (s, t) in self.smoothed.iter_mut().zip(target) {
            *s += (t - *s) * SMOOTHING_FACTOR;
        }
    }
}

fn clamp_coord(v: f32, limit: u32) -> u32 {
    if v.is_nan() {
        return 0;
    }
    (v.round().max(0.0) as u32).min(limit - 1)
}

/// Mean of R, G, B over 255.
fn luminance(image: &RgbaImage, x: u32, y: u32) -> f32 {
    let p = image.get_pixel(x, y).0;
    (p[0] as f32 + p[1] as f32 + p[2] as f32) / 3.0 / 255.0
}
