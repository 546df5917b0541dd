//! CPU software renderer.
//!
//! Rasterizes the lit, textured face mesh (and the optional wireframe) into a
//! transparent RGBA framebuffer the compositor draws over the photo.

use crate::scene::{normalize, Scene};
use crate::surface::blend_over;
use image::{Rgba, RgbaImage};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("renderer resources already released")]
    Released,
    #[error("cannot render a {width}x{height} scene")]
    EmptyTarget { width: u32, height: u32 },
}

/// Renders a scene into an offscreen frame.
pub trait Renderer {
    /// Render `scene` and return the frame. The frame is valid until the next call.
    fn render(&mut self, scene: &Scene) -> Result<&RgbaImage, RenderError>;

    /// Free the framebuffer. Later renders fail with [`RenderError::Released`].
    fn release(&mut self);
}

/// Barycentric triangle rasterizer with Lambert shading.
#[derive(Debug, Default)]
pub struct SoftwareRenderer {
    framebuffer: Option<RgbaImage>,
    released: bool,
    frames: u64,
}

impl SoftwareRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Renderer for SoftwareRenderer {
    fn render(&mut self, scene: &Scene) -> Result<&RgbaImage, RenderError> {
        if self.released {
            return Err(RenderError::Released);
        }
        let (width, height) = (scene.width, scene.height);
        if width == 0 || height == 0 {
            return Err(RenderError::EmptyTarget { width, height });
        }

        if self.framebuffer.as_ref().map(|fb| fb.dimensions()) != Some((width, height)) {
            tracing::debug!(width, height, "allocating framebuffer");
            self.framebuffer = Some(RgbaImage::new(width, height));
        }
        let Some(fb) = self.framebuffer.as_mut() else {
            return Err(RenderError::Released);
        };
        for p in fb.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }

        draw_mask(fb, scene);
        let edge_pixels = draw_wireframe(fb, scene);

        self.frames += 1;
        tracing::trace!(frame = self.frames, edge_pixels, "frame rendered");
        Ok(&*fb)
    }

    fn release(&mut self) {
        if !self.released {
            tracing::debug!(frames = self.frames, "releasing renderer");
        }
        self.framebuffer = None;
        self.released = true;
    }
}

/// Screen-space vertex: pixel x, pixel y (down), world z.
type ScreenVertex = [f32; 3];

fn project_all(scene: &Scene, transform: &crate::scene::Transform) -> Vec<ScreenVertex> {
    scene
        .geometry
        .positions
        .iter()
        .map(|&p| {
            let world = transform.apply(p);
            let [sx, sy] = scene.camera.project(world, scene.width, scene.height);
            [sx, sy, world[2]]
        })
        .collect()
}

fn draw_mask(fb: &mut RgbaImage, scene: &Scene) {
    let transform = scene.mask_transform;
    let screen = project_all(scene, &transform);
    let normals: Vec<[f32; 3]> = scene
        .geometry
        .normals
        .iter()
        .map(|&n| transform.apply_normal(n))
        .collect();
    let uvs = &scene.geometry.uvs;
    let material = &scene.material;
    let tint = material.tint.factors();

    for tri in &scene.geometry.indices {
        let idx = tri.map(|i| i as usize);
        if idx.iter().any(|&i| !scene.camera.in_depth_range(screen[i][2])) {
            continue;
        }

        rasterize(fb, [screen[idx[0]], screen[idx[1]], screen[idx[2]]], |w| {
            let mut n = [0.0f32; 3];
            let mut uv = [0.0f32; 2];
            for (k, &vi) in idx.iter().enumerate() {
                for c in 0..3 {
                    n[c] += normals[vi][c] * w[k];
                }
                uv[0] += uvs[vi][0] * w[k];
                uv[1] += uvs[vi][1] * w[k];
            }
            // Double-sided: shade whichever side faces the camera.
            let mut n = normalize(n);
            if n[2] < 0.0 {
                n = [-n[0], -n[1], -n[2]];
            }

            let texel = material.sample(uv[0], uv[1]);
            let alpha = texel[3] * material.opacity;
            if alpha < material.alpha_test {
                return None;
            }
            let light = scene.lights.shade(n);
            let channel = |c: usize| ((texel[c] * tint[c] * light).clamp(0.0, 1.0) * 255.0).round() as u8;
            Some(Rgba([
                channel(0),
                channel(1),
                channel(2),
                (alpha.clamp(0.0, 1.0) * 255.0).round() as u8,
            ]))
        });
    }
}

/// Draw every triangle edge; returns the number of pixels the line walk visited.
fn draw_wireframe(fb: &mut RgbaImage, scene: &Scene) -> usize {
    let Some(wireframe) = scene.wireframe else {
        return 0;
    };
    let screen = project_all(scene, &wireframe.transform);
    let (w, h) = fb.dimensions();
    let mut visited = 0;

    for tri in &scene.geometry.indices {
        let idx = tri.map(|i| i as usize);
        if idx.iter().any(|&i| !scene.camera.in_depth_range(screen[i][2])) {
            continue;
        }
        for (a, b) in [(idx[0], idx[1]), (idx[1], idx[2]), (idx[2], idx[0])] {
            let from = [screen[a][0], screen[a][1]];
            let to = [screen[b][0], screen[b][1]];
            for_each_line_pixel(from, to, (w, h), |x, y| {
                visited += 1;
                if x >= 0 && y >= 0 && (x as u32) < w && (y as u32) < h {
                    blend_over(fb.get_pixel_mut(x as u32, y as u32), wireframe.color);
                }
            });
        }
    }
    visited
}

/// Edge function: positive when `p` is to the right of `a -> b` in y-down space.
///
/// Always evaluated from the lexicographically smaller endpoint so that
/// `edge(b, a, p)` is the exact negation of `edge(a, b, p)`.
fn edge(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    let raw = |a: [f32; 2], b: [f32; 2]| (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0]);
    if (a[0], a[1]) <= (b[0], b[1]) {
        raw(a, b)
    } else {
        -raw(b, a)
    }
}

/// Tie-break for pixels exactly on an edge so shared edges are filled once.
fn owns_edge(a: [f32; 2], b: [f32; 2]) -> bool {
    let dy = b[1] - a[1];
    dy < 0.0 || (dy == 0.0 && b[0] > a[0])
}

/// Fill a triangle, calling `shade` with barycentric weights for each covered
/// pixel center. Either winding is accepted.
fn rasterize<F>(fb: &mut RgbaImage, verts: [ScreenVertex; 3], mut shade: F)
where
    F: FnMut([f32; 3]) -> Option<Rgba<u8>>,
{
    let p = verts.map(|v| [v[0], v[1]]);
    let area = edge(p[0], p[1], p[2]);
    if area == 0.0 || !area.is_finite() {
        return;
    }
    // Normalize to positive area; remember the swap for the weights.
    let (order, area) = if area > 0.0 { ([0, 1, 2], area) } else { ([0, 2, 1], -area) };
    let [a, b, c] = order.map(|i| p[i]);

    let (w, h) = fb.dimensions();
    let min_x = a[0].min(b[0]).min(c[0]).floor().max(0.0) as i64;
    let min_y = a[1].min(b[1]).min(c[1]).floor().max(0.0) as i64;
    let max_x = (a[0].max(b[0]).max(c[0]).ceil() as i64).min(w as i64 - 1);
    let max_y = (a[1].max(b[1]).max(c[1]).ceil() as i64).min(h as i64 - 1);

    let inside = |e: f32, from: [f32; 2], to: [f32; 2]| e > 0.0 || (e == 0.0 && owns_edge(from, to));

    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let pc = [x as f32 + 0.5, y as f32 + 0.5];
            let wa = edge(b, c, pc);
            let wb = edge(c, a, pc);
            let wc = edge(a, b, pc);
            if !(inside(wa, b, c) && inside(wb, c, a) && inside(wc, a, b)) {
                continue;
            }
            let mut weights = [0.0f32; 3];
            weights[order[0]] = wa / area;
            weights[order[1]] = wb / area;
            weights[order[2]] = wc / area;

            if let Some(color) = shade(weights) {
                blend_over(fb.get_pixel_mut(x as u32, y as u32), color);
            }
        }
    }
}

/// Visit every pixel on the segment `from -> to` that can land inside a
/// `width` x `height` target (DDA, one sample per major-axis step).
///
/// The segment is clipped to `[0, width] x [0, height]` first, so the walk
/// never exceeds the target's extent however far away the endpoints are.
pub(crate) fn for_each_line_pixel(
    from: [f32; 2],
    to: [f32; 2],
    (width, height): (u32, u32),
    mut plot: impl FnMut(i64, i64),
) {
    let Some((from, to)) = clip_segment(from, to, width, height) else {
        return;
    };
    let dx = to[0] - from[0];
    let dy = to[1] - from[1];
    let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as i64;
    let (sx, sy) = (dx / steps as f32, dy / steps as f32);
    for i in 0..=steps {
        let x = from[0] + sx * i as f32;
        let y = from[1] + sy * i as f32;
        plot(x.floor() as i64, y.floor() as i64);
    }
}

/// Liang-Barsky clip of a segment against `[0, width] x [0, height]`.
/// `None` when the segment misses the rectangle or is not finite.
fn clip_segment(from: [f32; 2], to: [f32; 2], width: u32, height: u32) -> Option<([f32; 2], [f32; 2])> {
    if !from.iter().chain(to.iter()).all(|v| v.is_finite()) {
        return None;
    }
    // f64 so the clipped endpoints keep sub-pixel precision for far-off inputs.
    let (x0, y0) = (from[0] as f64, from[1] as f64);
    let (dx, dy) = (to[0] as f64 - x0, to[1] as f64 - y0);
    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    let bounds = [
        (-dx, x0),
        (dx, width as f64 - x0),
        (-dy, y0),
        (dy, height as f64 - y0),
    ];
    for (p, q) in bounds {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            t0 = t0.max(r);
        } else {
            t1 = t1.min(r);
        }
        if t0 > t1 {
            return None;
        }
    }
    let at = |t: f64| {
        [
            (x0 + t * dx).clamp(0.0, width as f64) as f32,
            (y0 + t * dy).clamp(0.0, height as f64) as f32,
        ]
    };
    Some((at(t0), at(t1)))
}
