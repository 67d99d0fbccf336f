//! Capture sources: screen (with screenshot cache) and camera.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::RgbImage;
use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::{FrameBuffer, Resolution, SourceTag};

use crate::devices::{CameraDevice, ScreenGrabber};

/// Something that yields one frame per call.
pub trait CaptureSource: Send {
    /// Capture a frame stamped with `timestamp_ns`.
    fn capture(&mut self, timestamp_ns: u64) -> TarantinoResult<FrameBuffer>;

    /// Tag carried by frames from this source.
    fn tag(&self) -> SourceTag;

    /// Release the underlying device.
    fn close(&mut self);
}

/// Cache hit/miss counters of a [`ScreenSource`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScreenCacheStats {
    pub grabs: u64,
    pub hits: u64,
    pub failures: u64,
}

struct CachedShot {
    grabbed_at: Instant,
    /// Screenshot already resampled to the target resolution.
    image: Arc<RgbImage>,
}

/// Full-display source resampled to the output resolution.
///
/// A grabbed screenshot is served to every caller for `cache_ttl`, so the
/// recording and preview loops share one grab.
pub struct ScreenSource {
    grabber: Box<dyn ScreenGrabber>,
    target: Resolution,
    cache_ttl: Duration,
    cache: Option<CachedShot>,
    stats: ScreenCacheStats,
}

impl ScreenSource {
    pub fn new(grabber: Box<dyn ScreenGrabber>, target: Resolution, cache_ttl: Duration) -> Self {
        Self {
            grabber,
            target,
            cache_ttl,
            cache: None,
            stats: ScreenCacheStats::default(),
        }
    }

    pub fn target(&self) -> Resolution {
        self.target
    }

    pub fn stats(&self) -> ScreenCacheStats {
        self.stats
    }

    /// Cached screenshot if still fresh at `now`, otherwise a new grab.
    pub fn capture_at(&mut self, timestamp_ns: u64, now: Instant) -> TarantinoResult<FrameBuffer> {
        if let Some(shot) = &self.cache {
            if now.saturating_duration_since(shot.grabbed_at) < self.cache_ttl {
                self.stats.hits += 1;
                return Ok(self.frame_from(&shot.image, timestamp_ns));
            }
        }

        let raw = self.grabber.grab().map_err(|e| {
            self.stats.failures += 1;
            match e {
                TarantinoError::Capture { .. } => e,
                other => TarantinoError::capture(format!("Screen grab failed: {other}")),
            }
        })?;
        self.stats.grabs += 1;

        let image = if raw.dimensions() == (self.target.width, self.target.height) {
            raw
        } else {
            image::imageops::resize(&raw, self.target.width, self.target.height, FilterType::Lanczos3)
        };
        let image = Arc::new(image);
        let frame = self.frame_from(&image, timestamp_ns);
        self.cache = Some(CachedShot {
            grabbed_at: now,
            image,
        });
        Ok(frame)
    }

    fn frame_from(&self, image: &RgbImage, timestamp_ns: u64) -> FrameBuffer {
        FrameBuffer::new(image.clone(), timestamp_ns, SourceTag::Screen)
    }

    pub fn close(&mut self) {
        self.cache = None;
        self.grabber.close();
    }
}

impl CaptureSource for ScreenSource {
    fn capture(&mut self, timestamp_ns: u64) -> TarantinoResult<FrameBuffer> {
        self.capture_at(timestamp_ns, Instant::now())
    }

    fn tag(&self) -> SourceTag {
        SourceTag::Screen
    }

    fn close(&mut self) {
        ScreenSource::close(self);
    }
}

/// An opened camera.
pub struct CameraSource {
    device: Box<dyn CameraDevice>,
    index: u32,
    failed_reads: u64,
}

impl CameraSource {
    pub fn new(device: Box<dyn CameraDevice>, index: u32) -> Self {
        Self {
            device,
            index,
            failed_reads: 0,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Next frame, or `None` for a single failed read.
    pub fn read(&mut self, timestamp_ns: u64) -> Option<FrameBuffer> {
        match self.device.read_frame() {
            Some(image) => Some(FrameBuffer::new(image, timestamp_ns, SourceTag::Camera)),
            None => {
                self.failed_reads += 1;
                if self.failed_reads == 1 || self.failed_reads % 100 == 0 {
                    tracing::warn!(
                        camera = self.index,
                        failed_reads = self.failed_reads,
                        "Camera read returned no frame"
                    );
                }
                None
            }
        }
    }

    pub fn failed_reads(&self) -> u64 {
        self.failed_reads
    }

    pub fn close(&mut self) {
        self.device.close();
    }
}

impl CaptureSource for CameraSource {
    fn capture(&mut self, timestamp_ns: u64) -> TarantinoResult<FrameBuffer> {
        self.read(timestamp_ns)
            .ok_or_else(|| TarantinoError::capture(format!("Camera {} returned no frame", self.index)))
    }

    fn tag(&self) -> SourceTag {
        SourceTag::Camera
    }

    fn close(&mut self) {
        CameraSource::close(self);
    }
}
