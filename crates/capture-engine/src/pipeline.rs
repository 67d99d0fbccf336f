//! GStreamer device backend.
//!
//! Capture devices are `<source> ! videoconvert ! RGBA ! appsink` (or the
//! S16LE audio equivalent) pipelines pulled on demand; the video sink is an
//! `appsrc ! x264enc ! matroskamux ! filesink` pipeline fed frame by frame.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use image::RgbImage;
use tarantino_audio::AudioInput;
use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::{AudioFormat, AudioSourceKind, FrameBuffer, SourceTag};

use crate::devices::{CameraDevice, DeviceBackend, ScreenGrabber, VideoSink, VideoSinkConfig};

/// Upper bound for one pull from a capture appsink.
const PULL_TIMEOUT: Duration = Duration::from_millis(500);

/// Upper bound for one audio pull; short so the audio loop sees its stop flag.
const AUDIO_PULL_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound for the EOS drain when finishing the video sink.
const EOS_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Elements `tarantino check` reports on.
pub const REQUIRED_ELEMENTS: &[&str] = &[
    "appsrc",
    "appsink",
    "videoconvert",
    "audioconvert",
    "x264enc",
    "h264parse",
    "matroskamux",
    "filesink",
];

#[cfg(target_os = "linux")]
pub const PLATFORM_ELEMENTS: &[&str] = &["ximagesrc", "v4l2src", "pulsesrc"];
#[cfg(target_os = "windows")]
pub const PLATFORM_ELEMENTS: &[&str] = &["d3d11screencapturesrc", "ksvideosrc", "wasapisrc"];
#[cfg(target_os = "macos")]
pub const PLATFORM_ELEMENTS: &[&str] = &["avfvideosrc", "osxaudiosrc"];
#[cfg(not(any(target_os = "linux", target_os = "windows", target_os = "macos")))]
pub const PLATFORM_ELEMENTS: &[&str] = &[];

pub fn init_gstreamer() -> TarantinoResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(TarantinoError::device(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

/// Availability of each element the backend needs on this platform.
pub fn element_report() -> TarantinoResult<Vec<(&'static str, bool)>> {
    init_gstreamer()?;
    Ok(REQUIRED_ELEMENTS
        .iter()
        .chain(PLATFORM_ELEMENTS)
        .map(|name| (*name, gst::ElementFactory::find(name).is_some()))
        .collect())
}

fn screen_source() -> &'static str {
    if cfg!(target_os = "windows") {
        "d3d11screencapturesrc show-cursor=true"
    } else if cfg!(target_os = "macos") {
        "avfvideosrc capture-screen=true capture-screen-cursor=true"
    } else {
        "ximagesrc use-damage=false show-pointer=true"
    }
}

fn camera_source(index: u32) -> String {
    if cfg!(target_os = "windows") {
        format!("ksvideosrc device-index={index}")
    } else if cfg!(target_os = "macos") {
        format!("avfvideosrc device-index={index}")
    } else {
        format!("v4l2src device=/dev/video{index}")
    }
}

fn audio_source(kind: AudioSourceKind) -> TarantinoResult<&'static str> {
    match kind {
        AudioSourceKind::Microphone => Ok(if cfg!(target_os = "windows") {
            "wasapisrc low-latency=true"
        } else if cfg!(target_os = "macos") {
            "osxaudiosrc"
        } else {
            "pulsesrc"
        }),
        AudioSourceKind::System => {
            if cfg!(target_os = "windows") {
                Ok("wasapisrc loopback=true low-latency=true")
            } else if cfg!(target_os = "macos") {
                Err(TarantinoError::stream(
                    "System audio loopback is not available on macOS without a virtual device",
                ))
            } else {
                Ok("pulsesrc device=@DEFAULT_MONITOR@")
            }
        }
    }
}

/// Launch line ending in a capture appsink that keeps only the newest buffer.
fn rgba_capture_launch(source: &str) -> String {
    format!(
        "{source} ! queue max-size-buffers=2 leaky=downstream ! videoconvert ! video/x-raw,format=RGBA ! appsink name=sink max-buffers=1 drop=true sync=false"
    )
}

fn audio_capture_launch(source: &str, format: &AudioFormat) -> String {
    format!(
        "{source} ! audioconvert ! audioresample ! audio/x-raw,format=S16LE,layout=interleaved,rate={},channels={} ! appsink name=sink sync=false",
        format.sample_rate, format.channels
    )
}

fn video_sink_launch(path: &Path, config: &VideoSinkConfig) -> String {
    let path = escape_path(path);
    let keyint = config.fps.saturating_mul(2).max(2);
    format!(
        "appsrc name=src ! videoconvert ! x264enc tune=zerolatency speed-preset=veryfast bitrate={} key-int-max={keyint} ! h264parse ! matroskamux ! filesink location=\"{path}\"",
        config.bitrate_kbps
    )
}

fn escape_path(path: &Path) -> String {
    path.to_string_lossy().replace('"', "\\\"")
}

fn parse_pipeline(launch: &str) -> TarantinoResult<gst::Pipeline> {
    init_gstreamer()?;
    let element = gst::parse::launch(launch)
        .map_err(|e| TarantinoError::device(format!("Failed to build pipeline: {e}")))?;
    element
        .dynamic_cast::<gst::Pipeline>()
        .map_err(|_| TarantinoError::device("Launch string did not produce a pipeline"))
}

/// Set `pipeline` playing and wait at most `timeout` for it to get there.
fn play_within(name: &str, pipeline: &gst::Pipeline, timeout: Duration) -> TarantinoResult<()> {
    let started = pipeline.set_state(gst::State::Playing);
    let waited = pipeline.state(gst::ClockTime::from_nseconds(timeout.as_nanos() as u64));
    let outcome = match (started, waited) {
        (Err(e), _) => Err(format!("refused to start: {e:?}")),
        (_, (Ok(_), gst::State::Playing, _)) => Ok(()),
        (_, (Ok(_), state, _)) => Err(format!("still {state:?} after {timeout:?}")),
        (_, (Err(e), _, _)) => Err(format!("failed to reach Playing: {e:?}")),
    };
    outcome.map_err(|reason| {
        let _ = pipeline.set_state(gst::State::Null);
        TarantinoError::device(format!("{name} pipeline {reason}"))
    })
}

/// A playing pipeline ending in an appsink named `sink`.
struct AppSinkPipeline {
    name: String,
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
}

impl AppSinkPipeline {
    fn launch(name: &str, launch: &str, timeout: Duration) -> TarantinoResult<Self> {
        tracing::debug!(pipeline = name, launch, "Opening capture pipeline");
        let pipeline = parse_pipeline(launch)?;
        let sink = pipeline
            .by_name("sink")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSink>().ok())
            .ok_or_else(|| TarantinoError::device(format!("{name} pipeline has no appsink")))?;
        play_within(name, &pipeline, timeout)?;
        tracing::info!(pipeline = name, "Capture pipeline playing");
        Ok(Self {
            name: name.to_string(),
            pipeline,
            sink,
        })
    }

    fn pull(&self, timeout: Duration) -> Option<gst::Sample> {
        self.sink
            .try_pull_sample(gst::ClockTime::from_nseconds(timeout.as_nanos() as u64))
    }

    /// Next video sample as an RGB image.
    fn pull_rgb(&self, timeout: Duration) -> Option<RgbImage> {
        let sample = self.pull(timeout)?;
        let structure = sample.caps()?.structure(0)?;
        let width = structure.get::<i32>("width").ok()? as u32;
        let height = structure.get::<i32>("height").ok()? as u32;
        let buffer = sample.buffer()?;
        let map = buffer.map_readable().ok()?;
        FrameBuffer::from_rgba(width, height, map.as_slice(), 0, SourceTag::Screen)
            .map(|frame| frame.image)
    }

    fn close(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(pipeline = %self.name, error = ?e, "Failed to stop capture pipeline");
        }
    }
}

impl Drop for AppSinkPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

struct GstScreenGrabber {
    inner: AppSinkPipeline,
}

impl ScreenGrabber for GstScreenGrabber {
    fn grab(&mut self) -> TarantinoResult<RgbImage> {
        self.inner
            .pull_rgb(PULL_TIMEOUT)
            .ok_or_else(|| TarantinoError::capture("No screen frame within pull timeout"))
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

struct GstCamera {
    inner: AppSinkPipeline,
}

impl CameraDevice for GstCamera {
    fn read_frame(&mut self) -> Option<RgbImage> {
        self.inner.pull_rgb(PULL_TIMEOUT)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

struct GstAudioInput {
    inner: AppSinkPipeline,
    format: AudioFormat,
    pending: VecDeque<i16>,
}

impl AudioInput for GstAudioInput {
    fn read_chunk(&mut self, max_samples: usize) -> TarantinoResult<Vec<i16>> {
        while self.pending.len() < max_samples {
            let Some(sample) = self.inner.pull(AUDIO_PULL_TIMEOUT) else {
                if self.inner.sink.is_eos() {
                    return Err(TarantinoError::stream("Audio stream reached end of stream"));
                }
                break;
            };
            let buffer = sample
                .buffer()
                .ok_or_else(|| TarantinoError::stream("Audio sample without buffer"))?;
            let map = buffer
                .map_readable()
                .map_err(|e| TarantinoError::stream(format!("Failed to map audio buffer: {e}")))?;
            self.pending.extend(
                map.as_slice()
                    .chunks_exact(2)
                    .map(|b| i16::from_le_bytes([b[0], b[1]])),
            );
        }
        let take = self.pending.len().min(max_samples);
        Ok(self.pending.drain(..take).collect())
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn name(&self) -> &str {
        &self.inner.name
    }
}

/// Intermediate H.264/Matroska writer fed through an appsrc.
pub struct GstVideoSink {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    path: PathBuf,
    config: VideoSinkConfig,
    frames_written: u64,
}

impl GstVideoSink {
    pub fn open(path: &Path, config: &VideoSinkConfig) -> TarantinoResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let pipeline = parse_pipeline(&video_sink_launch(path, config))?;
        let appsrc = pipeline
            .by_name("src")
            .and_then(|e| e.dynamic_cast::<gst_app::AppSrc>().ok())
            .ok_or_else(|| TarantinoError::write("Video sink pipeline has no appsrc"))?;

        let caps = gst::Caps::builder("video/x-raw")
            .field("format", "RGBA")
            .field("width", config.resolution.width as i32)
            .field("height", config.resolution.height as i32)
            .field("framerate", gst::Fraction::new(config.fps as i32, 1))
            .build();
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            TarantinoError::write(format!("Failed to start video sink pipeline: {e:?}"))
        })?;

        tracing::info!(
            path = %path.display(),
            resolution = %config.resolution,
            fps = config.fps,
            bitrate_kbps = config.bitrate_kbps,
            "Video sink opened"
        );
        Ok(Self {
            pipeline,
            appsrc,
            path: path.to_path_buf(),
            config: *config,
            frames_written: 0,
        })
    }

    /// Wait for EOS to reach the filesink, bounded by [`EOS_DRAIN_TIMEOUT`].
    fn drain(&self) -> TarantinoResult<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        let start = Instant::now();
        loop {
            let Some(remaining) = EOS_DRAIN_TIMEOUT.checked_sub(start.elapsed()) else {
                tracing::warn!("EOS drain timed out; container may be truncated");
                return Ok(());
            };
            let timeout = gst::ClockTime::from_nseconds(remaining.as_nanos() as u64);
            match bus.timed_pop(timeout) {
                Some(msg) => match msg.view() {
                    gst::MessageView::Eos(_) => {
                        tracing::debug!("EOS received; video sink drained");
                        return Ok(());
                    }
                    gst::MessageView::Error(e) => {
                        return Err(TarantinoError::write(format!(
                            "Video sink error during drain: {}",
                            e.error()
                        )));
                    }
                    _ => {}
                },
                None => {
                    tracing::warn!("EOS drain timed out; container may be truncated");
                    return Ok(());
                }
            }
        }
    }
}

impl VideoSink for GstVideoSink {
    fn write(&mut self, frame: &FrameBuffer) -> TarantinoResult<()> {
        if frame.resolution() != self.config.resolution {
            return Err(TarantinoError::write(format!(
                "Frame is {}, sink expects {}",
                frame.resolution(),
                self.config.resolution
            )));
        }
        let mut buffer = gst::Buffer::from_mut_slice(frame.to_rgba_bytes());
        {
            let buffer = buffer
                .get_mut()
                .ok_or_else(|| TarantinoError::write("Frame buffer is not writable"))?;
            let pts = self.config.pts_of(self.frames_written);
            buffer.set_pts(gst::ClockTime::from_nseconds(pts.as_nanos() as u64));
            buffer.set_duration(gst::ClockTime::from_nseconds(self.config.frame_period_ns()));
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| TarantinoError::write(format!("Failed to push frame: {e:?}")))?;
        self.frames_written += 1;
        Ok(())
    }

    fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn finish(self: Box<Self>) -> TarantinoResult<PathBuf> {
        let drained = match self.appsrc.end_of_stream() {
            Ok(_) => self.drain(),
            Err(e) => {
                tracing::warn!(error = ?e, "Failed to send EOS; output may be truncated");
                Ok(())
            }
        };
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| TarantinoError::write(format!("Failed to stop video sink: {e:?}")))?;
        drained?;
        tracing::info!(
            path = %self.path.display(),
            frames = self.frames_written,
            "Video sink finished"
        );
        Ok(self.path.clone())
    }
}

impl Drop for GstVideoSink {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

/// Production backend built on GStreamer.
#[derive(Debug, Default, Clone)]
pub struct GstBackend;

impl GstBackend {
    pub fn new() -> TarantinoResult<Self> {
        init_gstreamer()?;
        Ok(Self)
    }
}

impl DeviceBackend for GstBackend {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn open_screen(&self, timeout: Duration) -> TarantinoResult<Box<dyn ScreenGrabber>> {
        let inner = AppSinkPipeline::launch("screen", &rgba_capture_launch(screen_source()), timeout)?;
        Ok(Box::new(GstScreenGrabber { inner }))
    }

    fn open_camera(&self, index: u32, timeout: Duration) -> TarantinoResult<Box<dyn CameraDevice>> {
        let launch = rgba_capture_launch(&camera_source(index));
        let inner = AppSinkPipeline::launch(&format!("camera{index}"), &launch, timeout)?;
        Ok(Box::new(GstCamera { inner }))
    }

    fn open_audio(
        &self,
        format: AudioFormat,
        kind: AudioSourceKind,
        timeout: Duration,
    ) -> TarantinoResult<Box<dyn AudioInput>> {
        let launch = audio_capture_launch(audio_source(kind)?, &format);
        let name = match kind {
            AudioSourceKind::Microphone => "mic",
            AudioSourceKind::System => "system-audio",
        };
        let inner = AppSinkPipeline::launch(name, &launch, timeout)
            .map_err(|e| TarantinoError::stream(e.to_string()))?;
        Ok(Box::new(GstAudioInput {
            inner,
            format,
            pending: VecDeque::new(),
        }))
    }

    fn open_video_sink(
        &self,
        path: &Path,
        config: &VideoSinkConfig,
    ) -> TarantinoResult<Box<dyn VideoSink>> {
        Ok(Box::new(GstVideoSink::open(path, config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarantino_frame_model::Resolution;

    #[test]
    fn video_sink_launch_carries_bitrate_and_escaped_path() {
        let config = VideoSinkConfig {
            resolution: Resolution::new(1280, 720),
            fps: 30,
            bitrate_kbps: 4500,
        };
        let launch = video_sink_launch(Path::new("/tmp/my \"take\".video.mkv"), &config);
        assert!(launch.starts_with("appsrc name=src ! videoconvert ! x264enc"));
        assert!(launch.contains("bitrate=4500"));
        assert!(launch.contains("key-int-max=60"));
        assert!(launch.contains("location=\"/tmp/my \\\"take\\\".video.mkv\""));
    }

    #[test]
    fn audio_launch_requests_interleaved_s16le() {
        let launch = audio_capture_launch("pulsesrc", &AudioFormat::default());
        assert!(launch.contains("format=S16LE,layout=interleaved,rate=44100,channels=2"));
        assert!(launch.ends_with("appsink name=sink sync=false"));
    }

    #[test]
    fn capture_launch_keeps_newest_buffer_only() {
        let launch = rgba_capture_launch(&camera_source(2));
        assert!(launch.contains("video/x-raw,format=RGBA"));
        assert!(launch.contains("max-buffers=1 drop=true"));
    }
}
