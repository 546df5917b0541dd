//! 2-D raster target surface.
//!
//! The render loop only needs to clear, composite images and read pixels
//! back. Debug drawing adds single-pixel blending on top of that.

use image::{Rgba, RgbaImage};

/// A 2-D drawing surface the compositor writes frames into.
pub trait Surface {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Resize to `width` x `height`, discarding contents.
    fn resize(&mut self, width: u32, height: u32);

    /// Reset every pixel to transparent black.
    fn clear(&mut self);

    /// Alpha-composite `image` with its top-left corner at (`x`, `y`).
    fn draw_image(&mut self, image: &RgbaImage, x: i64, y: i64);

    /// Alpha-composite a single pixel. Out-of-bounds coordinates are ignored.
    fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba<u8>);

    fn read_pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>>;
}

/// In-memory RGBA surface.
#[derive(Debug, Clone)]
pub struct Canvas {
    pixels: RgbaImage,
    writes: u64,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            writes: 0,
        }
    }

    /// Current contents.
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn into_image(self) -> RgbaImage {
        self.pixels
    }

    /// Number of mutating calls since creation.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

impl Surface for Canvas {
    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.writes += 1;
        self.pixels = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        self.writes += 1;
        for p in self.pixels.pixels_mut() {
            *p = Rgba([0, 0, 0, 0]);
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, x: i64, y: i64) {
        self.writes += 1;
        for (sx, sy, src) in image.enumerate_pixels() {
            let dx = x + sx as i64;
            let dy = y + sy as i64;
            if let Some(dst) = pixel_mut(&mut self.pixels, dx, dy) {
                blend_over(dst, *src);
            }
        }
    }

    fn blend_pixel(&mut self, x: i64, y: i64, color: Rgba<u8>) {
        self.writes += 1;
        if let Some(dst) = pixel_mut(&mut self.pixels, x, y) {
            blend_over(dst, color);
        }
    }

    fn read_pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        self.pixels.get_pixel_checked(x, y).copied()
    }
}

fn pixel_mut(image: &mut RgbaImage, x: i64, y: i64) -> Option<&mut Rgba<u8>> {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        return None;
    }
    Some(image.get_pixel_mut(x as u32, y as u32))
}

/// Source-over compositing of straight-alpha colors.
pub fn blend_over(dst: &mut Rgba<u8>, src: Rgba<u8>) {
    let sa = src.0[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    if sa >= 1.0 {
        *dst = src;
        return;
    }
    let da = dst.0[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let s = src.0[c] as f32;
        let d = dst.0[c] as f32;
        let v = (s * sa + d * da * (1.0 - sa)) / out_a;
        dst.0[c] = v.round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::solid;

    #[test]
    fn test_blend_opaque_replaces() {
        let mut dst = Rgba([10, 20, 30, 255]);
        blend_over(&mut dst, Rgba([200, 100, 50, 255]));
        assert_eq!(dst, Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn test_blend_transparent_keeps() {
        let mut dst = Rgba([10, 20, 30, 255]);
        blend_over(&mut dst, Rgba([200, 100, 50, 0]));
        assert_eq!(dst, Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_blend_half_over_opaque() {
        let mut dst = Rgba([0, 0, 0, 255]);
        blend_over(&mut dst, Rgba([200, 100, 0, 128]));
        assert_eq!(dst.0[3], 255);
        assert!((dst.0[0] as i32 - 100).abs() <= 1, "r = {}", dst.0[0]);
        assert!((dst.0[1] as i32 - 50).abs() <= 1, "g = {}", dst.0[1]);
    }

    #[test]
    fn test_blend_over_empty_keeps_color() {
        let mut dst = Rgba([0, 0, 0, 0]);
        blend_over(&mut dst, Rgba([200, 100, 50, 128]));
        assert_eq!(&dst.0[..3], &[200, 100, 50]);
        assert_eq!(dst.0[3], 128);
    }

    #[test]
    fn test_draw_image_clips_to_bounds() {
        let mut canvas = Canvas::new(4, 4);
        canvas.draw_image(&solid(3, 3, [255, 0, 0, 255]), 2, -1);
        assert_eq!(canvas.read_pixel(2, 0), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(canvas.read_pixel(3, 1), Some(Rgba([255, 0, 0, 255])));
        assert_eq!(canvas.read_pixel(1, 0), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(canvas.read_pixel(2, 2), Some(Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_clear_and_write_count() {
        let mut canvas = Canvas::new(2, 2);
        canvas.draw_image(&solid(2, 2, [1, 2, 3, 255]), 0, 0);
        canvas.clear();
        assert_eq!(canvas.read_pixel(0, 0), Some(Rgba([0, 0, 0, 0])));
        assert_eq!(canvas.writes(), 2);
    }

    #[test]
    fn test_read_pixel_out_of_bounds() {
        let canvas = Canvas::new(2, 2);
        assert_eq!(canvas.read_pixel(2, 0), None);
    }

    #[test]
    fn test_resize() {
        let mut canvas = Canvas::new(2, 2);
        canvas.resize(5, 3);
        assert_eq!((canvas.width(), canvas.height()), (5, 3));
    }
}
