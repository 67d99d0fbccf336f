//! Pixel-level helpers shared by the effect stages.

use image::{Rgb, RgbImage};

/// Round and saturate a channel value into `0..=255`.
#[inline]
pub fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Linear blend `input * (1 - mix) + effect * mix`, per channel.
#[inline]
pub fn mix_channel(input: u8, effect: u8, mix: f32) -> u8 {
    clamp_u8(input as f32 * (1.0 - mix) + effect as f32 * mix)
}

/// Blend `effect` into `target` in place. Both images must share dimensions.
pub fn blend_into(target: &mut RgbImage, effect: &RgbImage, mix: f32) {
    debug_assert_eq!(target.dimensions(), effect.dimensions());
    for (dst, src) in target.iter_mut().zip(effect.iter()) {
        *dst = mix_channel(*dst, *src, mix);
    }
}

/// Map every channel byte through a 256-entry table.
pub fn apply_lut(image: &mut RgbImage, lut: &[u8; 256]) {
    for value in image.iter_mut() {
        *value = lut[*value as usize];
    }
}

/// Build a lookup table from a per-value transfer function.
pub fn build_lut(transfer: impl Fn(f32) -> f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (i, slot) in lut.iter_mut().enumerate() {
        *slot = clamp_u8(transfer(i as f32));
    }
    lut
}

/// RGB (0..=255) to HSV with hue in degrees `[0, 360)`, saturation and value in `[0, 1]`.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> (f32, f32, f32) {
    let r = rgb[0] as f32 / 255.0;
    let g = rgb[1] as f32 / 255.0;
    let b = rgb[2] as f32 / 255.0;
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (hue.rem_euclid(360.0), saturation, max)
}

/// Inverse of [`rgb_to_hsv`].
pub fn hsv_to_rgb(hue: f32, saturation: f32, value: f32) -> [u8; 3] {
    let hue = hue.rem_euclid(360.0);
    let saturation = saturation.clamp(0.0, 1.0);
    let value = value.clamp(0.0, 1.0);

    let chroma = value * saturation;
    let sector = hue / 60.0;
    let x = chroma * (1.0 - (sector.rem_euclid(2.0) - 1.0).abs());
    let (r, g, b) = match sector as u32 {
        0 => (chroma, x, 0.0),
        1 => (x, chroma, 0.0),
        2 => (0.0, chroma, x),
        3 => (0.0, x, chroma),
        4 => (x, 0.0, chroma),
        _ => (chroma, 0.0, x),
    };
    let m = value - chroma;
    [
        clamp_u8((r + m) * 255.0),
        clamp_u8((g + m) * 255.0),
        clamp_u8((b + m) * 255.0),
    ]
}

/// BT.601 luma of an RGB pixel.
#[inline]
pub fn luma(rgb: [u8; 3]) -> f32 {
    0.299 * rgb[0] as f32 + 0.587 * rgb[1] as f32 + 0.114 * rgb[2] as f32
}

/// 3x3 convolution with edge clamping: `sum(k * p) / divisor + offset`.
///
/// Kernel is row-major, centered on the output pixel.
pub fn convolve3x3(src: &RgbImage, kernel: &[f32; 9], divisor: f32, offset: f32) -> RgbImage {
    let (width, height) = src.dimensions();
    let mut out = RgbImage::new(width, height);
    if width == 0 || height == 0 {
        return out;
    }
    let max_x = width as i64 - 1;
    let max_y = height as i64 - 1;

    for y in 0..height {
        for x in 0..width {
            let mut acc = [0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                if *weight == 0.0 {
                    continue;
                }
                let sx = (x as i64 + (k % 3) as i64 - 1).clamp(0, max_x) as u32;
                let sy = (y as i64 + (k / 3) as i64 - 1).clamp(0, max_y) as u32;
                let p = src.get_pixel(sx, sy);
                for c in 0..3 {
                    acc[c] += weight * p[c] as f32;
                }
            }
            out.put_pixel(
                x,
                y,
                Rgb([
                    clamp_u8(acc[0] / divisor + offset),
                    clamp_u8(acc[1] / divisor + offset),
                    clamp_u8(acc[2] / divisor + offset),
                ]),
            );
        }
    }
    out
}

/// Separable box blur of the given radius, edges clamped.
pub fn box_blur(image: &mut RgbImage, radius: u32) {
    let (width, height) = image.dimensions();
    if radius == 0 || width == 0 || height == 0 {
        return;
    }
    let horizontal = blur_pass(image.as_raw(), width, height, radius, Axis::Horizontal);
    let vertical = blur_pass(&horizontal, width, height, radius, Axis::Vertical);
    image.copy_from_slice(&vertical);
}

#[derive(Clone, Copy)]
enum Axis {
    Horizontal,
    Vertical,
}

/// One running-sum pass along `axis`.
fn blur_pass(src: &[u8], width: u32, height: u32, radius: u32, axis: Axis) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let (lines, len) = match axis {
        Axis::Horizontal => (h, w),
        Axis::Vertical => (w, h),
    };
    let r = radius as i64;
    let window = 2 * radius + 1;
    let last = len as i64 - 1;
    let mut out = vec![0u8; src.len()];

    for line in 0..lines {
        let index = |pos: i64, c: usize| -> usize {
            let pos = pos.clamp(0, last) as usize;
            let pixel = match axis {
                Axis::Horizontal => line * w + pos,
                Axis::Vertical => pos * w + line,
            };
            pixel * 3 + c
        };
        for c in 0..3 {
            let mut sum: u32 = (-r..=r).map(|d| src[index(d, c)] as u32).sum();
            for pos in 0..len as i64 {
                out[index(pos, c)] = ((sum + window / 2) / window) as u8;
                sum += src[index(pos + r + 1, c)] as u32;
                sum -= src[index(pos - r, c)] as u32;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_rounds_and_saturates() {
        assert_eq!(clamp_u8(-3.0), 0);
        assert_eq!(clamp_u8(300.0), 255);
        assert_eq!(clamp_u8(127.5), 128);
        assert_eq!(clamp_u8(f32::NAN), 0);
    }

    #[test]
    fn hsv_round_trips_primaries() {
        for rgb in [[255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 0], [12, 34, 56]] {
            let (h, s, v) = rgb_to_hsv(rgb);
            assert_eq!(hsv_to_rgb(h, s, v), rgb);
        }
        assert_eq!(rgb_to_hsv([0, 255, 0]).0, 120.0);
    }

    #[test]
    fn blur_leaves_uniform_image_unchanged() {
        let mut image = RgbImage::from_pixel(9, 5, Rgb([40, 80, 120]));
        box_blur(&mut image, 3);
        assert!(image.pixels().all(|p| p.0 == [40, 80, 120]));
    }

    #[test]
    fn blur_spreads_a_single_bright_pixel() {
        let mut image = RgbImage::new(7, 7);
        image.put_pixel(3, 3, Rgb([255, 255, 255]));
        box_blur(&mut image, 1);
        // 255 / 3 per pass, rounded: 85, then 85 / 3 rounded: 28.
        assert_eq!(image.get_pixel(3, 3).0, [28, 28, 28]);
        assert_eq!(image.get_pixel(2, 2).0, [28, 28, 28]);
        assert_eq!(image.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn identity_kernel_copies_input() {
        let mut image = RgbImage::new(4, 3);
        image.put_pixel(1, 1, Rgb([9, 99, 199]));
        let kernel = [0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
        assert_eq!(convolve3x3(&image, &kernel, 1.0, 0.0), image);
    }
}
