//! Before/after comparison layouts.

use image::imageops::{self, FilterType};
use image::RgbaImage;

/// Place `before` and `after` next to each other, top-aligned.
pub fn side_by_side(before: &RgbaImage, after: &RgbaImage) -> RgbaImage {
    let width = before.width() + after.width();
    let height = before.height().max(after.height());
    let mut out = RgbaImage::new(width, height);
    imageops::replace(&mut out, before, 0, 0);
    imageops::replace(&mut out, after, before.width() as i64, 0);
    out
}

/// Wipe comparison: `after` covers the left `slider` percent, `before` the rest.
///
/// `after` is resampled to the size of `before` when they differ. `slider`
/// is clamped to 0..=100.
pub fn before_after(before: &RgbaImage, after: &RgbaImage, slider: u8) -> RgbaImage {
    let slider = u32::from(slider.min(100));
    let resized;
    let after = if after.dimensions() == before.dimensions() {
        after
    } else {
        resized = imageops::resize(after, before.width(), before.height(), FilterType::Triangle);
        &resized
    };

    let split = before.width() * slider / 100;
    let mut out = before.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        if x < split {
            *px = *after.get_pixel(x, y);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::solid;
    use image::Rgba;

    #[test]
    fn test_side_by_side_layout() {
        let before = solid(4, 3, [255, 0, 0, 255]);
        let after = solid(2, 5, [0, 255, 0, 255]);
        let out = side_by_side(&before, &after);
        assert_eq!(out.dimensions(), (6, 5));
        assert_eq!(*out.get_pixel(3, 2), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.get_pixel(4, 4), Rgba([0, 255, 0, 255]));
        // Below the shorter image stays transparent.
        assert_eq!(*out.get_pixel(0, 4), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_before_after_split() {
        let before = solid(10, 2, [0, 0, 0, 255]);
        let after = solid(10, 2, [255, 255, 255, 255]);
        let out = before_after(&before, &after, 30);
        assert_eq!(*out.get_pixel(2, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(3, 1), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_before_after_extremes() {
        let before = solid(8, 8, [0, 0, 0, 255]);
        let after = solid(8, 8, [9, 9, 9, 255]);
        assert_eq!(before_after(&before, &after, 0), before);
        assert_eq!(before_after(&before, &after, 100), after);
        assert_eq!(before_after(&before, &after, 250), after);
    }

    #[test]
    fn test_before_after_resizes_after() {
        let before = solid(10, 10, [0, 0, 0, 255]);
        let after = solid(5, 5, [200, 0, 0, 255]);
        let out = before_after(&before, &after, 50);
        assert_eq!(out.dimensions(), (10, 10));
        assert_eq!(*out.get_pixel(1, 9), Rgba([200, 0, 0, 255]));
    }
}
