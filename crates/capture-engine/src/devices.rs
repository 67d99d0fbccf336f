//! Device backend interface.
//!
//! Everything that touches real hardware goes through [`DeviceBackend`]:
//! the GStreamer backend in production, the synthetic backend for dry runs
//! and tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use image::RgbImage;
use tarantino_audio::AudioInput;
use tarantino_common::error::TarantinoResult;
use tarantino_frame_model::{AudioFormat, AudioSourceKind, FrameBuffer, Resolution};

/// Full-display screenshot source.
pub trait ScreenGrabber: Send {
    /// Grab the current display contents at native resolution.
    fn grab(&mut self) -> TarantinoResult<RgbImage>;

    /// Release the device.
    fn close(&mut self) {}
}

/// An opened camera.
pub trait CameraDevice: Send {
    /// Read the next frame. `None` is a single failed read, not a dead device.
    fn read_frame(&mut self) -> Option<RgbImage>;

    /// Release the device.
    fn close(&mut self) {}
}

/// Encoding parameters for the intermediate video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSinkConfig {
    pub resolution: Resolution,
    pub fps: u32,
    pub bitrate_kbps: u32,
}

impl VideoSinkConfig {
    /// Presentation time of frame `index`.
    pub fn pts_of(&self, index: u64) -> Duration {
        Duration::from_nanos(index.saturating_mul(self.frame_period_ns()))
    }

    pub fn frame_period_ns(&self) -> u64 {
        1_000_000_000 / self.fps.max(1) as u64
    }
}

/// Persists composite frames to the intermediate container.
pub trait VideoSink: Send {
    /// Append one frame. Every frame handed over is written.
    fn write(&mut self, frame: &FrameBuffer) -> TarantinoResult<()>;

    /// Frames accepted so far.
    fn frames_written(&self) -> u64;

    /// Flush and close the container, returning its path.
    fn finish(self: Box<Self>) -> TarantinoResult<PathBuf>;
}

/// Opens capture devices and sinks.
pub trait DeviceBackend: Send + Sync {
    /// Backend name.
    fn name(&self) -> &str;

    /// Open the primary display for screenshots.
    fn open_screen(&self, timeout: Duration) -> TarantinoResult<Box<dyn ScreenGrabber>>;

    /// Open the camera with the given index.
    fn open_camera(&self, index: u32, timeout: Duration) -> TarantinoResult<Box<dyn CameraDevice>>;

    /// Open an audio input delivering `format`.
    fn open_audio(
        &self,
        format: AudioFormat,
        kind: AudioSourceKind,
        timeout: Duration,
    ) -> TarantinoResult<Box<dyn AudioInput>>;

    /// Create the intermediate video container at `path`.
    fn open_video_sink(
        &self,
        path: &Path,
        config: &VideoSinkConfig,
    ) -> TarantinoResult<Box<dyn VideoSink>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pts_advances_by_frame_period() {
        let config = VideoSinkConfig {
            resolution: Resolution::new(640, 480),
            fps: 25,
            bitrate_kbps: 1000,
        };
        assert_eq!(config.frame_period_ns(), 40_000_000);
        assert_eq!(config.pts_of(0), Duration::ZERO);
        assert_eq!(config.pts_of(50), Duration::from_secs(2));
    }
}
