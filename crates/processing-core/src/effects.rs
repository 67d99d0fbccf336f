//! Effect pipeline.
//!
//! Turns an [`EffectParameters`] snapshot into an ordered list of
//! [`EffectStage`]s and runs them over a frame. Stages whose control sits at
//! its identity value are skipped, so the identity configuration returns the
//! input frame untouched.
//!
//! Stage order is fixed:
//! brightness/contrast, blur, hue, saturation, sharpen, gamma, temperature,
//! tint, vignette, noise, sepia, grayscale, invert, edge enhance, emboss,
//! posterize, solarize.

use image::{Rgb, RgbImage};
use tarantino_frame_model::{EffectParameters, FrameBuffer};

use crate::color::{
    apply_lut, blend_into, box_blur, build_lut, clamp_u8, convolve3x3, hsv_to_rgb, luma,
    rgb_to_hsv,
};

const SEPIA_MATRIX: [[f32; 3]; 3] = [
    [0.393, 0.769, 0.189],
    [0.349, 0.686, 0.168],
    [0.272, 0.534, 0.131],
];

const EDGE_ENHANCE_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 10.0, -1.0, -1.0, -1.0, -1.0];
const EDGE_ENHANCE_DIVISOR: f32 = 2.0;

const EMBOSS_KERNEL: [f32; 9] = [-1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0];
const EMBOSS_OFFSET: f32 = 128.0;

/// One active transform with its parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectStage {
    BrightnessContrast { brightness: f32, contrast: f32 },
    Blur { radius: u32 },
    HueShift { degrees: f32 },
    Saturation { factor: f32 },
    Sharpen { amount: f32 },
    Gamma { gamma: f32 },
    Temperature { shift: f32 },
    Tint { shift: f32 },
    Vignette { strength: f32 },
    Noise { amount: f32 },
    Sepia { mix: f32 },
    Grayscale { mix: f32 },
    Invert { mix: f32 },
    EdgeEnhance { mix: f32 },
    Emboss { mix: f32 },
    Posterize { levels: u8 },
    Solarize { threshold: u8 },
}

impl EffectStage {
    /// Active stages for `params`, in application order.
    pub fn plan(params: &EffectParameters) -> Vec<EffectStage> {
        let mut stages = Vec::new();
        if params.brightness != 0.0 || params.contrast != 1.0 {
            stages.push(Self::BrightnessContrast {
                brightness: params.brightness,
                contrast: params.contrast,
            });
        }
        if params.blur_radius > 0 {
            stages.push(Self::Blur {
                radius: params.blur_radius,
            });
        }
        if params.hue_shift != 0.0 {
            stages.push(Self::HueShift {
                degrees: params.hue_shift,
            });
        }
        if params.saturation != 1.0 {
            stages.push(Self::Saturation {
                factor: params.saturation,
            });
        }
        if params.sharpness > 0.0 {
            stages.push(Self::Sharpen {
                amount: params.sharpness,
            });
        }
        if params.gamma != 1.0 {
            stages.push(Self::Gamma {
                gamma: params.gamma,
            });
        }
        if params.temperature != 0.0 {
            stages.push(Self::Temperature {
                shift: params.temperature,
            });
        }
        if params.tint != 0.0 {
            stages.push(Self::Tint { shift: params.tint });
        }
        if params.vignette > 0.0 {
            stages.push(Self::Vignette {
                strength: params.vignette,
            });
        }
        if params.noise > 0.0 {
            stages.push(Self::Noise {
                amount: params.noise,
            });
        }
        if params.sepia > 0.0 {
            stages.push(Self::Sepia { mix: params.sepia });
        }
        if params.grayscale > 0.0 {
            stages.push(Self::Grayscale {
                mix: params.grayscale,
            });
        }
        if params.invert > 0.0 {
            stages.push(Self::Invert { mix: params.invert });
        }
        if params.edge_enhance > 0.0 {
            stages.push(Self::EdgeEnhance {
                mix: params.edge_enhance,
            });
        }
        if params.emboss > 0.0 {
            stages.push(Self::Emboss { mix: params.emboss });
        }
        if params.posterize_levels >= 2 {
            stages.push(Self::Posterize {
                levels: params.posterize_levels,
            });
        }
        if params.solarize_threshold > 0 {
            stages.push(Self::Solarize {
                threshold: params.solarize_threshold,
            });
        }
        stages
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BrightnessContrast { .. } => "brightness_contrast",
            Self::Blur { .. } => "blur",
            Self::HueShift { .. } => "hue_shift",
            Self::Saturation { .. } => "saturation",
            Self::Sharpen { .. } => "sharpen",
            Self::Gamma { .. } => "gamma",
            Self::Temperature { .. } => "temperature",
            Self::Tint { .. } => "tint",
            Self::Vignette { .. } => "vignette",
            Self::Noise { .. } => "noise",
            Self::Sepia { .. } => "sepia",
            Self::Grayscale { .. } => "grayscale",
            Self::Invert { .. } => "invert",
            Self::EdgeEnhance { .. } => "edge_enhance",
            Self::Emboss { .. } => "emboss",
            Self::Posterize { .. } => "posterize",
            Self::Solarize { .. } => "solarize",
        }
    }

    /// Apply this stage in place. `seed` drives the noise pattern.
    pub fn apply(&self, image: &mut RgbImage, seed: u64) {
        match *self {
            Self::BrightnessContrast {
                brightness,
                contrast,
            } => {
                let lut = build_lut(|v| v * contrast + brightness);
                apply_lut(image, &lut);
            }
            Self::Blur { radius } => box_blur(image, radius),
            Self::HueShift { degrees } => map_hsv(image, |h, s, v| (h + degrees, s, v)),
            Self::Saturation { factor } => map_hsv(image, |h, s, v| (h, s * factor, v)),
            Self::Sharpen { amount } => {
                let kernel = [
                    0.0,
                    -amount,
                    0.0,
                    -amount,
                    1.0 + 4.0 * amount,
                    -amount,
                    0.0,
                    -amount,
                    0.0,
                ];
                *image = convolve3x3(image, &kernel, 1.0, 0.0);
            }
            Self::Gamma { gamma } => {
                let inverse = 1.0 / gamma;
                let lut = build_lut(|v| 255.0 * (v / 255.0).powf(inverse));
                apply_lut(image, &lut);
            }
            Self::Temperature { shift } => {
                for px in image.pixels_mut() {
                    px[0] = clamp_u8(px[0] as f32 + shift);
                    px[2] = clamp_u8(px[2] as f32 - shift);
                }
            }
            Self::Tint { shift } => {
                for px in image.pixels_mut() {
                    px[1] = clamp_u8(px[1] as f32 + shift);
                }
            }
            Self::Vignette { strength } => vignette(image, strength),
            Self::Noise { amount } => add_noise(image, amount, seed),
            Self::Sepia { mix } => {
                let effect = map_pixels(image, |p| {
                    let [r, g, b] = p.map(|c| c as f32);
                    SEPIA_MATRIX.map(|row| clamp_u8(row[0] * r + row[1] * g + row[2] * b))
                });
                blend_into(image, &effect, mix);
            }
            Self::Grayscale { mix } => {
                let effect = map_pixels(image, |p| {
                    let l = clamp_u8(luma(p));
                    [l, l, l]
                });
                blend_into(image, &effect, mix);
            }
            Self::Invert { mix } => {
                let effect = map_pixels(image, |p| p.map(|c| 255 - c));
                blend_into(image, &effect, mix);
            }
            Self::EdgeEnhance { mix } => {
                let effect = convolve3x3(image, &EDGE_ENHANCE_KERNEL, EDGE_ENHANCE_DIVISOR, 0.0);
                blend_into(image, &effect, mix);
            }
            Self::Emboss { mix } => {
                let effect = convolve3x3(image, &EMBOSS_KERNEL, 1.0, EMBOSS_OFFSET);
                blend_into(image, &effect, mix);
            }
            Self::Posterize { levels } => {
                let step = 255.0 / (levels as f32 - 1.0);
                let lut = build_lut(|v| (v / step).round() * step);
                apply_lut(image, &lut);
            }
            Self::Solarize { threshold } => {
                for value in image.iter_mut() {
                    if *value >= threshold {
                        *value = 255 - *value;
                    }
                }
            }
        }
    }
}

/// Applies the active effect stages to frames.
#[derive(Debug, Clone, Default)]
pub struct EffectPipeline {
    /// Total frames processed, for diagnostics.
    frames_processed: u64,
}

impl EffectPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run every active stage over `frame` in the fixed order.
    ///
    /// The frame keeps its dimensions, timestamp, and source tag.
    pub fn apply(&mut self, mut frame: FrameBuffer, params: &EffectParameters) -> FrameBuffer {
        self.frames_processed += 1;
        if params.is_identity() {
            return frame;
        }
        let stages = EffectStage::plan(params);
        if self.frames_processed == 1 {
            tracing::debug!(
                stages = ?stages.iter().map(EffectStage::name).collect::<Vec<_>>(),
                "Effect pipeline active"
            );
        }
        for stage in &stages {
            stage.apply(&mut frame.image, frame.timestamp_ns);
        }
        frame
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }
}

fn map_pixels(image: &RgbImage, f: impl Fn([u8; 3]) -> [u8; 3]) -> RgbImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        *px = Rgb(f(px.0));
    }
    out
}

fn map_hsv(image: &mut RgbImage, f: impl Fn(f32, f32, f32) -> (f32, f32, f32)) {
    for px in image.pixels_mut() {
        let (h, s, v) = rgb_to_hsv(px.0);
        let (h, s, v) = f(h, s, v);
        *px = Rgb(hsv_to_rgb(h, s, v));
    }
}

fn vignette(image: &mut RgbImage, strength: f32) {
    let (width, height) = image.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let max_dist_sq = cx * cx + cy * cy;
    if max_dist_sq <= 0.0 {
        return;
    }
    for (x, y, px) in image.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let factor = 1.0 - strength * (dx * dx + dy * dy) / max_dist_sq;
        for c in 0..3 {
            px[c] = clamp_u8(px[c] as f32 * factor);
        }
    }
}

fn add_noise(image: &mut RgbImage, amount: f32, seed: u64) {
    for (i, value) in image.iter_mut().enumerate() {
        let offset = noise_unit(seed, i as u64) * amount;
        *value = clamp_u8(*value as f32 + offset);
    }
}

/// Deterministic value in `[-1, 1]` for a (seed, index) pair.
fn noise_unit(seed: u64, index: u64) -> f32 {
    let mut z = seed ^ index.wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    ((z >> 40) as f32 / (1u64 << 24) as f32) * 2.0 - 1.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarantino_frame_model::{Resolution, SourceTag};

    fn solid(rgb: [u8; 3]) -> FrameBuffer {
        FrameBuffer::filled(Resolution::new(6, 4), rgb, 42, SourceTag::Screen)
    }

    fn run(frame: FrameBuffer, params: EffectParameters) -> FrameBuffer {
        EffectPipeline::new().apply(frame, &params)
    }

    #[test]
    fn identity_returns_input_unchanged() {
        let mut frame = solid([10, 20, 30]);
        frame.image.put_pixel(2, 1, Rgb([200, 0, 77]));
        let out = run(frame.clone(), EffectParameters::IDENTITY);
        assert_eq!(out, frame);
        assert!(EffectStage::plan(&EffectParameters::IDENTITY).is_empty());
    }

    #[test]
    fn plan_follows_fixed_order() {
        let params = EffectParameters {
            solarize_threshold: 200,
            invert: 0.5,
            brightness: 5.0,
            blur_radius: 1,
            ..Default::default()
        };
        let names: Vec<_> = EffectStage::plan(&params)
            .iter()
            .map(EffectStage::name)
            .collect();
        assert_eq!(names, ["brightness_contrast", "blur", "invert", "solarize"]);
    }

    #[test]
    fn brightness_and_contrast_saturate() {
        let out = run(
            solid([100, 200, 10]),
            EffectParameters {
                contrast: 2.0,
                brightness: -30.0,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(0, 0).0, [170, 255, 0]);
    }

    #[test]
    fn temperature_and_tint_shift_channels() {
        let out = run(
            solid([100, 100, 100]),
            EffectParameters {
                temperature: 20.0,
                tint: -10.0,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(3, 3).0, [120, 90, 80]);
    }

    #[test]
    fn gamma_brightens_midtones() {
        let out = run(
            solid([64, 0, 255]),
            EffectParameters {
                gamma: 2.0,
                ..Default::default()
            },
        );
        // 255 * (64/255)^0.5 = 127.75
        assert_eq!(out.image.get_pixel(0, 0).0, [128, 0, 255]);
    }

    #[test]
    fn sepia_at_full_mix_uses_matrix() {
        let out = run(
            solid([100, 100, 100]),
            EffectParameters {
                sepia: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(0, 0).0, [135, 120, 94]);
    }

    #[test]
    fn grayscale_uses_luma_weights() {
        let out = run(
            solid([255, 0, 0]),
            EffectParameters {
                grayscale: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(0, 0).0, [76, 76, 76]);
    }

    #[test]
    fn half_invert_blends_toward_complement() {
        let out = run(
            solid([100, 0, 255]),
            EffectParameters {
                invert: 0.5,
                ..Default::default()
            },
        );
        // 100 * 0.5 + 155 * 0.5 = 127.5 -> 128
        assert_eq!(out.image.get_pixel(0, 0).0, [128, 128, 128]);
    }

    #[test]
    fn posterize_two_levels_thresholds_at_midpoint() {
        let out = run(
            solid([127, 128, 255]),
            EffectParameters {
                posterize_levels: 2,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(0, 0).0, [0, 255, 255]);
    }

    #[test]
    fn solarize_inverts_values_at_or_above_threshold() {
        let out = run(
            solid([100, 128, 200]),
            EffectParameters {
                solarize_threshold: 128,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(0, 0).0, [100, 127, 55]);
    }

    #[test]
    fn emboss_of_flat_image_is_mid_gray() {
        let out = run(
            solid([90, 10, 250]),
            EffectParameters {
                emboss: 1.0,
                ..Default::default()
            },
        );
        assert!(out.image.pixels().all(|p| p.0 == [128, 128, 128]));
    }

    #[test]
    fn edge_enhance_of_flat_image_is_unchanged() {
        let frame = solid([60, 70, 80]);
        let out = run(
            frame.clone(),
            EffectParameters {
                edge_enhance: 1.0,
                ..Default::default()
            },
        );
        // (10 - 8) / 2 = 1x the center value on flat input.
        assert_eq!(out, frame);
    }

    #[test]
    fn vignette_darkens_corners_not_center() {
        let frame = FrameBuffer::filled(Resolution::new(5, 5), [200, 200, 200], 0, SourceTag::Screen);
        let out = run(
            frame,
            EffectParameters {
                vignette: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(2, 2).0, [200, 200, 200]);
        assert_eq!(out.image.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn noise_is_deterministic_per_timestamp() {
        let params = EffectParameters {
            noise: 40.0,
            ..Default::default()
        };
        let a = run(solid([128, 128, 128]), params);
        let b = run(solid([128, 128, 128]), params);
        assert_eq!(a, b);
        let c = run(solid([128, 128, 128]).with_timestamp(43), params);
        assert_ne!(a, c);
        assert!(a.pixels().iter().all(|v| (88..=168).contains(v)));
    }

    #[test]
    fn hue_rotation_moves_red_to_green() {
        let out = run(
            solid([255, 0, 0]),
            EffectParameters {
                hue_shift: 120.0,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(0, 0).0, [0, 255, 0]);
    }

    #[test]
    fn zero_saturation_is_gray() {
        let out = run(
            solid([200, 100, 50]),
            EffectParameters {
                saturation: 0.0,
                ..Default::default()
            },
        );
        assert_eq!(out.image.get_pixel(0, 0).0, [200, 200, 200]);
    }

    #[test]
    fn metadata_survives_processing() {
        let frame = solid([1, 2, 3]).with_source(SourceTag::Camera);
        let out = run(
            frame,
            EffectParameters {
                blur_radius: 2,
                sharpness: 1.0,
                ..Default::default()
            },
        );
        assert_eq!(out.resolution(), Resolution::new(6, 4));
        assert_eq!(out.timestamp_ns, 42);
        assert_eq!(out.source, SourceTag::Camera);
    }
}
