//! Diagnostic drawing: light samples, light direction and raw landmarks.

use crate::raster::for_each_line_pixel;
use crate::surface::Surface;
use crate::types::{Keypoint, Triangle};
use image::Rgba;

pub const SAMPLE_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const ARROW_COLOR: Rgba<u8> = Rgba([255, 255, 0, 255]);
pub const EDGE_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);
/// Pixels of arrow per unit of smoothed light offset.
const ARROW_SCALE: f32 = 50.0;
const ARROW_HEAD: f32 = 6.0;
const DOT_SIZE: i64 = 4;

/// Mark each light sample point and draw the current light direction from
/// the nose tip (last sample).
pub fn draw_light_debug<S: Surface + ?Sized>(surface: &mut S, samples: &[(u32, u32); 5], light: (f32, f32)) {
    for &(x, y) in samples {
        draw_dot(surface, x as f32, y as f32, SAMPLE_COLOR);
    }

    let (ox, oy) = samples[4];
    let from = [ox as f32, oy as f32];
    // Screen y grows downward.
    let to = [from[0] + light.0 * ARROW_SCALE, from[1] - light.1 * ARROW_SCALE];
    draw_line(surface, from, to, ARROW_COLOR);

    let (dx, dy) = (to[0] - from[0], to[1] - from[1]);
    let len = (dx * dx + dy * dy).sqrt();
    if len > ARROW_HEAD {
        let (ux, uy) = (dx / len, dy / len);
        for side in [-1.0f32, 1.0] {
            let back = [to[0] - ux * ARROW_HEAD, to[1] - uy * ARROW_HEAD];
            let wing = [back[0] - uy * ARROW_HEAD * 0.5 * side, back[1] + ux * ARROW_HEAD * 0.5 * side];
            draw_line(surface, to, wing, ARROW_COLOR);
        }
    }
}

/// Plot raw landmarks: a square per keypoint, then every triangle edge.
pub fn landmark_preview<S: Surface + ?Sized>(surface: &mut S, keypoints: &[Keypoint], triangles: &[Triangle]) {
    for kp in keypoints {
        draw_dot(surface, kp.x, kp.y, SAMPLE_COLOR);
    }
    for tri in triangles {
        let corners: Option<Vec<[f32; 2]>> = tri
            .iter()
            .map(|&i| keypoints.get(i as usize).map(|k| [k.x, k.y]))
            .collect();
        let Some(c) = corners else {
            continue;
        };
        for (a, b) in [(0, 1), (1, 2), (2, 0)] {
            draw_line(surface, c[a], c[b], EDGE_COLOR);
        }
    }
}

fn draw_dot<S: Surface + ?Sized>(surface: &mut S, x: f32, y: f32, color: Rgba<u8>) {
    let x0 = x.round() as i64 - DOT_SIZE / 2;
    let y0 = y.round() as i64 - DOT_SIZE / 2;
    for dy in 0..DOT_SIZE {
        for dx in 0..DOT_SIZE {
            surface.blend_pixel(x0 + dx, y0 + dy, color);
        }
    }
}

fn draw_line<S: Surface + ?Sized>(surface: &mut S, from: [f32; 2], to: [f32; 2], color: Rgba<u8>) {
    let bounds = (surface.width(), surface.height());
    for_each_line_pixel(from, to, bounds, |x, y| surface.blend_pixel(x, y, color));
}
