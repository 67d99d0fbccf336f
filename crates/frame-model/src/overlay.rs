//! Camera overlay layout.

use serde::{Deserialize, Serialize};
use tarantino_common::error::{TarantinoError, TarantinoResult};

use crate::frame::Resolution;

/// Placement of the camera overlay on top of the screen frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayState {
    /// Left edge in output pixels.
    pub x: i32,
    /// Top edge in output pixels.
    pub y: i32,
    /// Multiplier applied to `nominal`.
    pub scale: f32,
    /// Overlay size at scale 1.0.
    pub nominal: Resolution,
    /// Whether the camera overlay is shown at all.
    pub enabled: bool,
    /// Show only the overlay, stretched over the full output.
    pub fills_frame: bool,
}

impl Default for OverlayState {
    fn default() -> Self {
        Self {
            x: 20,
            y: 20,
            scale: 1.0,
            nominal: Resolution::new(320, 240),
            enabled: false,
            fills_frame: false,
        }
    }
}

/// Target rectangle of the scaled overlay in output pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl OverlayRect {
    /// Whether the rectangle lies entirely inside `bounds`.
    pub fn fits_within(&self, bounds: Resolution) -> bool {
        self.x >= 0
            && self.y >= 0
            && self.x as i64 + self.width as i64 <= bounds.width as i64
            && self.y as i64 + self.height as i64 <= bounds.height as i64
    }
}

impl OverlayState {
    pub const MAX_SCALE: f32 = 16.0;

    /// Overlay size after applying `scale`, never smaller than 1x1.
    pub fn scaled_size(&self) -> Resolution {
        let width = (self.nominal.width as f32 * self.scale).round().max(1.0) as u32;
        let height = (self.nominal.height as f32 * self.scale).round().max(1.0) as u32;
        Resolution::new(width, height)
    }

    /// Rectangle the overlay would occupy in the output frame.
    pub fn rect(&self) -> OverlayRect {
        let size = self.scaled_size();
        OverlayRect {
            x: self.x,
            y: self.y,
            width: size.width,
            height: size.height,
        }
    }

    /// Whether the camera contributes to the output at all.
    pub fn shows_camera(&self) -> bool {
        self.enabled || self.fills_frame
    }

    pub fn validate(&self) -> TarantinoResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 || self.scale > Self::MAX_SCALE {
            return Err(TarantinoError::config(format!(
                "Overlay scale {} is outside (0, {}]",
                self.scale,
                Self::MAX_SCALE
            )));
        }
        Ok(())
    }
}
