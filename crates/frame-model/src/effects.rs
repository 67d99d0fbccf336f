//! Effect parameters applied to every captured frame.

use serde::{Deserialize, Serialize};
use tarantino_common::error::{TarantinoError, TarantinoResult};

/// Snapshot of every continuous effect control.
///
/// `Default` is the identity configuration: every stage is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParameters {
    /// Additive offset applied after the contrast multiplier.
    pub brightness: f32,
    /// Multiplier applied before the brightness offset.
    pub contrast: f32,
    /// Box blur radius in pixels.
    pub blur_radius: u32,
    /// Hue rotation in degrees.
    pub hue_shift: f32,
    /// Saturation multiplier.
    pub saturation: f32,
    /// Unsharp kernel amount.
    pub sharpness: f32,
    pub gamma: f32,
    /// Positive warms (red up, blue down), negative cools.
    pub temperature: f32,
    /// Positive pushes green.
    pub tint: f32,
    /// Darkening at the corners, 0..=1.
    pub vignette: f32,
    /// Peak amplitude of additive noise.
    pub noise: f32,
    pub sepia: f32,
    pub grayscale: f32,
    pub invert: f32,
    pub edge_enhance: f32,
    pub emboss: f32,
    /// Quantization levels per channel; 0 disables.
    pub posterize_levels: u8,
    /// Channel values at or above this are inverted; 0 disables.
    pub solarize_threshold: u8,
}

impl Default for EffectParameters {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl EffectParameters {
    pub const IDENTITY: EffectParameters = EffectParameters {
        brightness: 0.0,
        contrast: 1.0,
        blur_radius: 0,
        hue_shift: 0.0,
        saturation: 1.0,
        sharpness: 0.0,
        gamma: 1.0,
        temperature: 0.0,
        tint: 0.0,
        vignette: 0.0,
        noise: 0.0,
        sepia: 0.0,
        grayscale: 0.0,
        invert: 0.0,
        edge_enhance: 0.0,
        emboss: 0.0,
        posterize_levels: 0,
        solarize_threshold: 0,
    };

    pub const MAX_BLUR_RADIUS: u32 = 32;

    /// Whether every control is at its identity value.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// Reject non-finite or out-of-range controls.
    pub fn validate(&self) -> TarantinoResult<()> {
        let ranged = [
            ("brightness", self.brightness, -255.0, 255.0),
            ("contrast", self.contrast, 0.0, 4.0),
            ("hue_shift", self.hue_shift, -180.0, 180.0),
            ("saturation", self.saturation, 0.0, 4.0),
            ("sharpness", self.sharpness, 0.0, 4.0),
            ("gamma", self.gamma, 0.1, 5.0),
            ("temperature", self.temperature, -100.0, 100.0),
            ("tint", self.tint, -100.0, 100.0),
            ("vignette", self.vignette, 0.0, 1.0),
            ("noise", self.noise, 0.0, 128.0),
            ("sepia", self.sepia, 0.0, 1.0),
            ("grayscale", self.grayscale, 0.0, 1.0),
            ("invert", self.invert, 0.0, 1.0),
            ("edge_enhance", self.edge_enhance, 0.0, 1.0),
            ("emboss", self.emboss, 0.0, 1.0),
        ];
        for (name, value, min, max) in ranged {
            if !value.is_finite() || value < min || value > max {
                return Err(TarantinoError::config(format!(
                    "Effect '{name}' = {value} is outside {min}..={max}"
                )));
            }
        }
        if self.blur_radius > Self::MAX_BLUR_RADIUS {
            return Err(TarantinoError::config(format!(
                "Effect 'blur_radius' = {} exceeds {}",
                self.blur_radius,
                Self::MAX_BLUR_RADIUS
            )));
        }
        if self.posterize_levels == 1 {
            return Err(TarantinoError::config(
                "Effect 'posterize_levels' must be 0 (off) or at least 2",
            ));
        }
        Ok(())
    }

    /// Load a parameter set from JSON; missing fields keep identity values.
    pub fn from_json(json: &str) -> TarantinoResult<Self> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_identity_and_valid() {
        let params = EffectParameters::default();
        assert!(params.is_identity());
        params.validate().unwrap();
    }

    #[test]
    fn rejects_out_of_range_and_nan() {
        let mut params = EffectParameters {
            gamma: 0.0,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        params.gamma = 1.0;
        params.sepia = f32::NAN;
        assert!(params.validate().is_err());

        params.sepia = 0.5;
        params.posterize_levels = 1;
        assert!(params.validate().is_err());

        params.posterize_levels = 4;
        params.blur_radius = 33;
        assert!(params.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_identity_for_missing_fields() {
        let params = EffectParameters::from_json(r#"{ "sepia": 0.5, "blur_radius": 2 }"#).unwrap();
        assert_eq!(params.sepia, 0.5);
        assert_eq!(params.blur_radius, 2);
        assert_eq!(params.contrast, 1.0);
        assert!(!params.is_identity());
        assert!(EffectParameters::from_json(r#"{ "invert": 3.0 }"#).is_err());
    }
}
