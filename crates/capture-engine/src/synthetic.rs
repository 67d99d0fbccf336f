//! Device backend that needs no hardware.
//!
//! Screens show a moving test pattern, cameras a drifting gradient, audio is a
//! sine tone and the video sink writes a plain-text frame log. Used by
//! `tarantino record --synthetic` and by the session tests.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{Rgb, RgbImage};
use tarantino_audio::{AudioInput, ToneInput};
use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::{AudioFormat, AudioSourceKind, FrameBuffer, Resolution};

use crate::devices::{CameraDevice, DeviceBackend, ScreenGrabber, VideoSink, VideoSinkConfig};

/// First line of every frame log.
pub const FRAME_LOG_HEADER: &str = "# tarantino synthetic frame log";

/// Failure injection and geometry of the synthetic devices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticOptions {
    pub screen_fails: bool,
    pub camera_fails: bool,
    pub audio_fails: bool,
    pub sink_fails: bool,
    /// Every n-th screen grab fails.
    pub grab_fails_every: Option<u32>,
    /// Every n-th frame write fails.
    pub write_fails_every: Option<u32>,
    /// Time `open_camera` blocks before answering.
    pub camera_open_delay: Duration,
    /// Native size of the synthetic display.
    pub screen_size: Resolution,
    pub camera_size: Resolution,
    pub tone_hz: f32,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            screen_fails: false,
            camera_fails: false,
            audio_fails: false,
            sink_fails: false,
            grab_fails_every: None,
            write_fails_every: None,
            camera_open_delay: Duration::ZERO,
            screen_size: Resolution::new(320, 180),
            camera_size: Resolution::new(160, 120),
            tone_hz: 440.0,
        }
    }
}

/// Open-handle counters shared by a backend and every device it opened.
#[derive(Debug, Default)]
pub struct SyntheticCounters {
    screens_open: AtomicUsize,
    cameras_open: AtomicUsize,
    screen_opens: AtomicU64,
    camera_opens: AtomicU64,
    audio_opens: AtomicU64,
    sinks_opened: AtomicU64,
}

impl SyntheticCounters {
    /// Screens currently open.
    pub fn screens_open(&self) -> usize {
        self.screens_open.load(Ordering::SeqCst)
    }

    /// Cameras currently open.
    pub fn cameras_open(&self) -> usize {
        self.cameras_open.load(Ordering::SeqCst)
    }

    /// Successful screen opens since creation.
    pub fn screen_opens(&self) -> u64 {
        self.screen_opens.load(Ordering::SeqCst)
    }

    pub fn camera_opens(&self) -> u64 {
        self.camera_opens.load(Ordering::SeqCst)
    }

    pub fn audio_opens(&self) -> u64 {
        self.audio_opens.load(Ordering::SeqCst)
    }

    pub fn sinks_opened(&self) -> u64 {
        self.sinks_opened.load(Ordering::SeqCst)
    }
}

/// Decrements an open counter exactly once, on close or drop.
struct OpenHandle {
    counters: Arc<SyntheticCounters>,
    kind: HandleKind,
    open: bool,
}

#[derive(Clone, Copy)]
enum HandleKind {
    Screen,
    Camera,
}

impl OpenHandle {
    fn new(counters: &Arc<SyntheticCounters>, kind: HandleKind) -> Self {
        let (open, total) = match kind {
            HandleKind::Screen => (&counters.screens_open, &counters.screen_opens),
            HandleKind::Camera => (&counters.cameras_open, &counters.camera_opens),
        };
        open.fetch_add(1, Ordering::SeqCst);
        total.fetch_add(1, Ordering::SeqCst);
        Self {
            counters: Arc::clone(counters),
            kind,
            open: true,
        }
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        let open = match self.kind {
            HandleKind::Screen => &self.counters.screens_open,
            HandleKind::Camera => &self.counters.cameras_open,
        };
        open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Drop for OpenHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Synthetic [`DeviceBackend`]. Clones share counters.
#[derive(Clone, Default)]
pub struct SyntheticBackend {
    options: SyntheticOptions,
    counters: Arc<SyntheticCounters>,
}

impl SyntheticBackend {
    pub fn new(options: SyntheticOptions) -> Self {
        Self {
            options,
            counters: Arc::new(SyntheticCounters::default()),
        }
    }

    pub fn options(&self) -> &SyntheticOptions {
        &self.options
    }

    pub fn counters(&self) -> &SyntheticCounters {
        &self.counters
    }
}

impl DeviceBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open_screen(&self, _timeout: Duration) -> TarantinoResult<Box<dyn ScreenGrabber>> {
        if self.options.screen_fails {
            return Err(TarantinoError::device("Synthetic screen unavailable"));
        }
        Ok(Box::new(TestPatternScreen {
            size: self.options.screen_size,
            phase: 0,
            attempts: 0,
            fail_every: self.options.grab_fails_every,
            handle: OpenHandle::new(&self.counters, HandleKind::Screen),
        }))
    }

    fn open_camera(&self, index: u32, timeout: Duration) -> TarantinoResult<Box<dyn CameraDevice>> {
        if !self.options.camera_open_delay.is_zero() {
            std::thread::sleep(self.options.camera_open_delay.min(timeout));
        }
        if self.options.camera_fails {
            return Err(TarantinoError::device(format!(
                "Synthetic camera {index} unavailable"
            )));
        }
        Ok(Box::new(GradientCamera {
            size: self.options.camera_size,
            frame: 0,
            handle: OpenHandle::new(&self.counters, HandleKind::Camera),
        }))
    }

    fn open_audio(
        &self,
        format: AudioFormat,
        kind: AudioSourceKind,
        _timeout: Duration,
    ) -> TarantinoResult<Box<dyn AudioInput>> {
        if self.options.audio_fails {
            return Err(TarantinoError::stream(format!(
                "Synthetic {kind:?} audio unavailable"
            )));
        }
        self.counters.audio_opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ToneInput::new(format, self.options.tone_hz, 0.5)))
    }

    fn open_video_sink(
        &self,
        path: &Path,
        config: &VideoSinkConfig,
    ) -> TarantinoResult<Box<dyn VideoSink>> {
        if self.options.sink_fails {
            return Err(TarantinoError::write(format!(
                "Synthetic sink refused {}",
                path.display()
            )));
        }
        let mut sink = FrameLogSink::create(path, *config)?;
        sink.fail_every = self.options.write_fails_every;
        self.counters.sinks_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(sink))
    }
}

/// Diagonal color bars that move one step per grab.
struct TestPatternScreen {
    size: Resolution,
    phase: u32,
    attempts: u64,
    fail_every: Option<u32>,
    handle: OpenHandle,
}

impl ScreenGrabber for TestPatternScreen {
    fn grab(&mut self) -> TarantinoResult<RgbImage> {
        const BARS: [[u8; 3]; 6] = [
            [230, 230, 230],
            [230, 230, 40],
            [40, 230, 230],
            [40, 230, 40],
            [230, 40, 230],
            [40, 40, 230],
        ];
        self.attempts += 1;
        if is_nth(self.attempts, self.fail_every) {
            return Err(TarantinoError::capture(format!(
                "Synthetic grab {} failed",
                self.attempts
            )));
        }
        let phase = self.phase;
        self.phase = self.phase.wrapping_add(4);
        let bar_width = (self.size.width / BARS.len() as u32).max(1);
        Ok(RgbImage::from_fn(self.size.width, self.size.height, |x, y| {
            let band = ((x + y / 2 + phase) / bar_width) as usize % BARS.len();
            Rgb(BARS[band])
        }))
    }

    fn close(&mut self) {
        self.handle.close();
    }
}

/// Gradient whose blue channel tracks the frame counter.
struct GradientCamera {
    size: Resolution,
    frame: u32,
    handle: OpenHandle,
}

impl CameraDevice for GradientCamera {
    fn read_frame(&mut self) -> Option<RgbImage> {
        let (w, h) = (self.size.width.max(1), self.size.height.max(1));
        let blue = (self.frame % 256) as u8;
        self.frame = self.frame.wrapping_add(1);
        Some(RgbImage::from_fn(w, h, |x, y| {
            Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, blue])
        }))
    }

    fn close(&mut self) {
        self.handle.close();
    }
}

/// Video sink that records one text line per frame instead of encoding.
///
/// Line format: `index pts_ns width height checksum`.
pub struct FrameLogSink {
    path: PathBuf,
    config: VideoSinkConfig,
    writer: BufWriter<File>,
    frames: u64,
    attempts: u64,
    fail_every: Option<u32>,
}

impl FrameLogSink {
    pub fn create(path: &Path, config: VideoSinkConfig) -> TarantinoResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path).map_err(|e| {
            TarantinoError::write(format!("Cannot create {}: {e}", path.display()))
        })?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "{FRAME_LOG_HEADER} {} fps={} bitrate={}",
            config.resolution, config.fps, config.bitrate_kbps
        )
        .map_err(|e| TarantinoError::write(format!("Frame log header: {e}")))?;
        Ok(Self {
            path: path.to_path_buf(),
            config,
            writer,
            frames: 0,
            attempts: 0,
            fail_every: None,
        })
    }
}

/// Whether the 1-based `attempt` is a multiple of `every`.
fn is_nth(attempt: u64, every: Option<u32>) -> bool {
    every.is_some_and(|n| n > 0 && attempt % n as u64 == 0)
}

/// Cheap order-sensitive checksum of the frame pixels.
pub fn pixel_checksum(frame: &FrameBuffer) -> u64 {
    frame.pixels().iter().fold(0xcbf2_9ce4_8422_2325, |hash, &b| {
        (hash ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

impl VideoSink for FrameLogSink {
    fn write(&mut self, frame: &FrameBuffer) -> TarantinoResult<()> {
        if frame.resolution() != self.config.resolution {
            return Err(TarantinoError::write(format!(
                "Frame is {} but sink expects {}",
                frame.resolution(),
                self.config.resolution
            )));
        }
        self.attempts += 1;
        if is_nth(self.attempts, self.fail_every) {
            return Err(TarantinoError::write(format!(
                "Synthetic write {} failed",
                self.attempts
            )));
        }
        let pts = self.config.pts_of(self.frames);
        writeln!(
            self.writer,
            "{} {} {} {} {:016x}",
            self.frames,
            pts.as_nanos(),
            frame.width(),
            frame.height(),
            pixel_checksum(frame)
        )
        .map_err(|e| TarantinoError::write(format!("Frame log write: {e}")))?;
        self.frames += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames
    }

    fn finish(mut self: Box<Self>) -> TarantinoResult<PathBuf> {
        self.writer
            .flush()
            .map_err(|e| TarantinoError::write(format!("Frame log flush: {e}")))?;
        tracing::debug!(path = %self.path.display(), frames = self.frames, "Frame log closed");
        Ok(self.path.clone())
    }
}

/// Frame lines of a frame log, header excluded.
pub fn read_frame_log(path: &Path) -> TarantinoResult<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .filter(|line| !line.starts_with('#') && !line.trim().is_empty())
        .map(str::to_string)
        .collect())
}
