//! Frame buffers and output geometry.

use std::fmt;
use std::str::FromStr;

use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use tarantino_common::error::TarantinoError;

/// Largest accepted output dimension on either axis.
pub const MAX_DIMENSION: u32 = 8192;

/// Where a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    Screen,
    Camera,
    /// Output of the compositor or transition stage.
    Composite,
}

/// Output geometry in pixels.
///
/// Serialized as the string `"WxH"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale down to at most `max_width`, preserving aspect ratio.
    pub fn fit_width(&self, max_width: u32) -> Resolution {
        if max_width == 0 || self.width <= max_width {
            return *self;
        }
        let height = (self.height as u64 * max_width as u64 / self.width as u64).max(1) as u32;
        Resolution::new(max_width, height)
    }
}

impl FromStr for Resolution {
    type Err = TarantinoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (w, h) = trimmed
            .split_once(['x', 'X'])
            .ok_or_else(|| TarantinoError::config(format!("Resolution '{s}' is not WxH")))?;
        let width = w
            .trim()
            .parse::<u32>()
            .map_err(|_| TarantinoError::config(format!("Invalid width in resolution '{s}'")))?;
        let height = h
            .trim()
            .parse::<u32>()
            .map_err(|_| TarantinoError::config(format!("Invalid height in resolution '{s}'")))?;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(TarantinoError::config(format!(
                "Resolution {width}x{height} is outside 1..={MAX_DIMENSION}"
            )));
        }
        Ok(Resolution { width, height })
    }
}

impl TryFrom<String> for Resolution {
    type Error = TarantinoError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Resolution> for String {
    fn from(value: Resolution) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One RGB frame moving through the recorder.
///
/// Stages take frames by value and hand a frame on; a frame is never shared
/// between two stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameBuffer {
    /// Pixel grid, 8 bits per channel, RGB interleaved.
    pub image: RgbImage,

    /// Capture time on the recording clock (ns).
    pub timestamp_ns: u64,

    /// Producer of the pixels.
    pub source: SourceTag,
}

impl FrameBuffer {
    /// Bytes per pixel of the channel layout.
    pub const CHANNELS: usize = 3;

    pub fn new(image: RgbImage, timestamp_ns: u64, source: SourceTag) -> Self {
        Self {
            image,
            timestamp_ns,
            source,
        }
    }

    /// A black frame of the given size.
    pub fn blank(resolution: Resolution, timestamp_ns: u64, source: SourceTag) -> Self {
        Self::filled(resolution, [0, 0, 0], timestamp_ns, source)
    }

    /// A frame filled with one color.
    pub fn filled(
        resolution: Resolution,
        rgb: [u8; 3],
        timestamp_ns: u64,
        source: SourceTag,
    ) -> Self {
        Self::new(
            RgbImage::from_pixel(resolution.width, resolution.height, Rgb(rgb)),
            timestamp_ns,
            source,
        )
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width(), self.height())
    }

    /// Raw interleaved RGB bytes.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// RGBA bytes with opaque alpha, the layout video encoders accept without
    /// row padding.
    pub fn to_rgba_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels().len() / 3 * 4);
        for px in self.pixels().chunks_exact(3) {
            out.extend_from_slice(&[px[0], px[1], px[2], 255]);
        }
        out
    }

    pub fn with_source(mut self, source: SourceTag) -> Self {
        self.source = source;
        self
    }

    pub fn with_timestamp(mut self, timestamp_ns: u64) -> Self {
        self.timestamp_ns = timestamp_ns;
        self
    }

    /// Resample to `target` with the given filter; returns `self` untouched
    /// when the size already matches.
    pub fn resized(self, target: Resolution, filter: FilterType) -> Self {
        if self.resolution() == target {
            return self;
        }
        let image = image::imageops::resize(&self.image, target.width, target.height, filter);
        Self { image, ..self }
    }

    /// Build an RGB frame from tightly packed RGBA bytes.
    pub fn from_rgba(
        width: u32,
        height: u32,
        rgba: &[u8],
        timestamp_ns: u64,
        source: SourceTag,
    ) -> Option<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() < expected {
            return None;
        }
        let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
        for px in rgba[..expected].chunks_exact(4) {
            rgb.extend_from_slice(&px[..3]);
        }
        RgbImage::from_raw(width, height, rgb).map(|image| Self::new(image, timestamp_ns, source))
    }
}
