//! Recording session management.
//!
//! A [`RecordingSession`] drives one recording: it takes a device lease, runs
//! the composition chain on a fixed-cadence thread feeding the video sink,
//! runs the audio engine alongside, and turns the intermediate artifacts into
//! the final file on stop.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tarantino_audio::{AudioCaptureEngine, AudioInput};
use tarantino_common::clock::{DriftMeasurement, FramePacer, RecordingClock};
use tarantino_common::config::AppConfig;
use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::{
    extension_of, AudioFormat, AudioSettings, OutputArtifact, Resolution,
    INTERMEDIATE_VIDEO_EXTENSION, MAX_DIMENSION,
};
use tarantino_render_engine::Muxer;
use tokio::sync::watch;

use crate::devices::{VideoSink, VideoSinkConfig};
use crate::hub::SourceHub;
use crate::scene::{LiveScene, SceneComposer};

/// Final containers the muxer is asked to produce.
pub const SUPPORTED_CONTAINERS: &[&str] = &["mp4", "mkv", "mov", "webm"];

/// Audio drift above this is logged as a warning.
const DRIFT_WARN_MS: f64 = 100.0;

/// Configuration for starting a new recording session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Base name of every artifact.
    pub name: String,

    /// Directory the artifacts are written to.
    pub output_dir: PathBuf,

    pub resolution: Resolution,

    /// Target FPS of the recording loop.
    pub fps: u32,

    pub bitrate_kbps: u32,

    /// Final container extension.
    pub container: String,

    pub audio_enabled: bool,

    /// Abort start() instead of recording video-only when audio fails.
    pub audio_required: bool,

    pub audio_format: AudioFormat,

    pub audio_settings: AudioSettings,

    /// Upper bound for opening the audio stream.
    pub open_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            name: "recording".to_string(),
            output_dir: PathBuf::from("."),
            resolution: Resolution::new(1920, 1080),
            fps: 30,
            bitrate_kbps: 6000,
            container: "mp4".to_string(),
            audio_enabled: true,
            audio_required: false,
            audio_format: AudioFormat::default(),
            audio_settings: AudioSettings::default(),
            open_timeout: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    /// Session named `name` with the recording defaults of `app`.
    pub fn from_app_config(app: &AppConfig, name: impl Into<String>) -> TarantinoResult<Self> {
        Ok(Self {
            name: name.into(),
            output_dir: app.output_dir.clone(),
            resolution: app.recording.resolution.parse()?,
            fps: app.recording.fps,
            bitrate_kbps: app.recording.bitrate_kbps,
            container: app.recording.container.clone(),
            audio_enabled: app.audio.enabled,
            audio_required: app.audio.required,
            audio_format: AudioFormat {
                sample_rate: app.audio.sample_rate,
                channels: app.audio.channels,
                chunk_frames: app.audio.chunk_frames,
            },
            audio_settings: AudioSettings::default(),
            open_timeout: Duration::from_millis(app.devices.open_timeout_ms),
        })
    }

    pub fn validate(&self) -> TarantinoResult<()> {
        if self.name.trim().is_empty() || self.name.contains(['/', '\\']) {
            return Err(TarantinoError::config(format!(
                "Invalid recording name '{}'",
                self.name
            )));
        }
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
            return Err(TarantinoError::config(format!(
                "Resolution {} is outside 1..={MAX_DIMENSION} on some axis",
                self.resolution
            )));
        }
        if !(1..=240).contains(&self.fps) {
            return Err(TarantinoError::config(format!(
                "FPS {} is outside 1..=240",
                self.fps
            )));
        }
        if self.bitrate_kbps == 0 {
            return Err(TarantinoError::config("Bitrate must be positive"));
        }
        let container = self.container.trim_start_matches('.').to_lowercase();
        if !SUPPORTED_CONTAINERS.contains(&container.as_str()) {
            return Err(TarantinoError::config(format!(
                "Unsupported container '{}' (expected one of {})",
                self.container,
                SUPPORTED_CONTAINERS.join(", ")
            )));
        }
        if self.audio_enabled {
            self.audio_format.validate()?;
            self.audio_settings.validate()?;
        }
        Ok(())
    }

    fn sink_config(&self) -> VideoSinkConfig {
        VideoSinkConfig {
            resolution: self.resolution,
            fps: self.fps,
            bitrate_kbps: self.bitrate_kbps,
        }
    }
}

/// State of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Session created (or reset) but not started.
    #[default]
    Idle,
    Recording,
    /// Devices stay open, nothing is written.
    Paused,
    /// Artifacts finalized.
    Stopped,
}

/// What a status subscriber sees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    pub state: SessionState,
    /// Last transient problem, if any. Does not imply a state change.
    pub message: Option<String>,
}

/// Summary of a finished recording.
#[derive(Debug, Clone)]
pub struct StopReport {
    pub artifact: OutputArtifact,
    /// Final file, `None` when it could not be produced.
    pub final_path: Option<PathBuf>,
    /// Intermediate audio, `None` when the session ran video-only.
    pub audio_path: Option<PathBuf>,
    pub frames_written: u64,
    pub write_failures: u64,
    /// Frames built from a substituted screen image after a failed grab.
    pub substituted_frames: u64,
    /// Active (non-paused) recording time.
    pub duration: Duration,
    pub audio_duration: Option<Duration>,
    /// Why the final file is missing.
    pub mux_error: Option<String>,
}

/// Result of [`RecordingSession::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub success: bool,
    pub message: String,
}

impl SaveOutcome {
    fn ok(path: &Path) -> Self {
        Self {
            success: true,
            message: format!("Saved recording to {}", path.display()),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// What the recording thread hands back when joined.
struct LoopOutput {
    sink: Box<dyn VideoSink>,
    composer: SceneComposer,
    write_failures: u64,
}

/// A recording session that coordinates the video and audio branches.
pub struct RecordingSession {
    config: SessionConfig,
    hub: Arc<SourceHub>,
    scene: Arc<LiveScene>,
    muxer: Arc<dyn Muxer>,
    state: SessionState,
    status: Arc<watch::Sender<SessionStatus>>,
    clock: Option<Arc<Mutex<RecordingClock>>>,
    paused: Arc<AtomicBool>,
    stop_flag: Arc<AtomicBool>,
    worker: Option<JoinHandle<Option<LoopOutput>>>,
    audio: Option<AudioCaptureEngine>,
    artifact: Option<OutputArtifact>,
    report: Option<StopReport>,
    final_elapsed: Duration,
}

impl RecordingSession {
    pub fn new(
        config: SessionConfig,
        hub: Arc<SourceHub>,
        scene: Arc<LiveScene>,
        muxer: Arc<dyn Muxer>,
    ) -> Self {
        let (status, _) = watch::channel(SessionStatus::default());
        Self {
            config,
            hub,
            scene,
            muxer,
            state: SessionState::Idle,
            status: Arc::new(status),
            clock: None,
            paused: Arc::new(AtomicBool::new(false)),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: None,
            audio: None,
            artifact: None,
            report: None,
            final_elapsed: Duration::ZERO,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn scene(&self) -> &Arc<LiveScene> {
        &self.scene
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Artifact paths of the current (or last) recording.
    pub fn artifact(&self) -> Option<&OutputArtifact> {
        self.artifact.as_ref()
    }

    /// Report of the last stop.
    pub fn report(&self) -> Option<&StopReport> {
        self.report.as_ref()
    }

    /// Whether the audio branch is running.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    /// Active recording time: wall time since start minus pauses, frozen
    /// while paused and after stop.
    pub fn elapsed(&self) -> Duration {
        match self.state {
            SessionState::Idle => Duration::ZERO,
            SessionState::Stopped => self.final_elapsed,
            SessionState::Recording | SessionState::Paused => self
                .clock
                .as_ref()
                .map(|clock| clock.lock().elapsed())
                .unwrap_or_default(),
        }
    }

    /// Change audio conditioning mid-session.
    pub fn update_audio_settings(&mut self, settings: AudioSettings) -> TarantinoResult<()> {
        settings.validate()?;
        self.config.audio_settings = settings;
        if let Some(audio) = &self.audio {
            audio.update_settings(settings);
        }
        Ok(())
    }

    /// Start recording.
    ///
    /// On error the session stays Idle and no device is left open.
    pub fn start(&mut self) -> TarantinoResult<()> {
        match self.state {
            SessionState::Recording | SessionState::Paused => {
                return Err(TarantinoError::invalid_state("Recording already in progress"));
            }
            SessionState::Stopped => self.reset(),
            SessionState::Idle => {}
        }

        self.config.validate()?;
        let scene = self.scene.snapshot();
        scene.validate()?;
        if self.hub.resolution() != self.config.resolution {
            return Err(TarantinoError::config(format!(
                "Device hub delivers {} but the session records {}",
                self.hub.resolution(),
                self.config.resolution
            )));
        }

        tracing::info!(
            name = %self.config.name,
            resolution = %self.config.resolution,
            fps = self.config.fps,
            backend = self.hub.backend().name(),
            "Starting recording session"
        );

        std::fs::create_dir_all(&self.config.output_dir)?;
        let artifact = OutputArtifact::in_dir(
            &self.config.output_dir,
            &self.config.name,
            &self.config.container,
        );

        let lease = self.hub.acquire(scene.overlay.shows_camera())?;
        let mut audio_input = self.open_audio_input()?;

        let sink = match self
            .hub
            .backend()
            .open_video_sink(&artifact.video, &self.config.sink_config())
        {
            Ok(sink) => sink,
            Err(e) => {
                if let Some(input) = audio_input.as_mut() {
                    input.close();
                }
                tracing::error!(error = %e, "Failed to open video sink");
                return Err(e);
            }
        };

        let audio = audio_input.and_then(|input| self.start_audio_engine(input, &artifact));

        self.paused.store(false, Ordering::SeqCst);
        self.stop_flag.store(false, Ordering::SeqCst);
        let clock = Arc::new(Mutex::new(RecordingClock::start()));
        let recording = RecordingLoop {
            composer: SceneComposer::new(Arc::clone(&self.scene), lease),
            sink,
            clock: Arc::clone(&clock),
            pacer: FramePacer::new(self.config.fps),
            stop_flag: Arc::clone(&self.stop_flag),
            paused: Arc::clone(&self.paused),
            status: Arc::clone(&self.status),
        };
        let worker = match recording.spawn() {
            Ok(worker) => worker,
            Err((e, recording)) => {
                tracing::error!(error = %e, "Failed to spawn recording thread");
                unwind_start(recording, audio);
                return Err(e.into());
            }
        };

        tracing::info!(epoch_wall = %clock.lock().epoch_wall(), "Recording clock started");
        self.worker = Some(worker);
        self.clock = Some(clock);
        self.audio = audio;
        self.artifact = Some(artifact);
        self.state = SessionState::Recording;
        self.publish(None);
        Ok(())
    }

    /// Pause recording (keeps devices open but stops writing).
    pub fn pause(&mut self) -> TarantinoResult<()> {
        if self.state != SessionState::Recording {
            return Err(TarantinoError::invalid_state("Not recording"));
        }
        if let Some(clock) = &self.clock {
            clock.lock().pause_at(Instant::now());
        }
        self.paused.store(true, Ordering::SeqCst);
        if let Some(audio) = &self.audio {
            audio.pause();
        }
        self.state = SessionState::Paused;
        self.publish(None);
        tracing::info!("Recording paused");
        Ok(())
    }

    /// Resume a paused recording.
    pub fn resume(&mut self) -> TarantinoResult<()> {
        if self.state != SessionState::Paused {
            return Err(TarantinoError::invalid_state("Not paused"));
        }
        let paused_for = self
            .clock
            .as_ref()
            .and_then(|clock| clock.lock().resume_at(Instant::now()));
        self.paused.store(false, Ordering::SeqCst);
        if let Some(audio) = &self.audio {
            audio.resume();
        }
        self.state = SessionState::Recording;
        self.publish(None);
        tracing::info!(paused_ms = paused_for.map(|d| d.as_millis() as u64), "Recording resumed");
        Ok(())
    }

    /// Stop recording and produce the final artifact.
    ///
    /// Returns `None` when nothing was recording, so a second call is a no-op.
    pub fn stop(&mut self) -> Option<StopReport> {
        if !matches!(self.state, SessionState::Recording | SessionState::Paused) {
            return None;
        }
        let artifact = self.artifact.clone()?;

        self.final_elapsed = self.elapsed();
        self.state = SessionState::Stopped;
        self.stop_flag.store(true, Ordering::SeqCst);
        tracing::info!(duration_secs = self.final_elapsed.as_secs_f64(), "Stopping recording");

        let mut messages = Vec::new();
        let (frames_written, write_failures, substituted_frames, video_ok) =
            match self.worker.take().map(JoinHandle::join) {
                Some(Ok(Some(output))) => {
                    let LoopOutput {
                        sink,
                        composer,
                        write_failures,
                    } = output;
                    let substituted = composer.capture_failures();
                    drop(composer);
                    let frames = sink.frames_written();
                    let finished = match sink.finish() {
                        Ok(path) => {
                            tracing::info!(path = %path.display(), frames, "Video artifact closed");
                            true
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to finalize video artifact");
                            messages.push(e.to_string());
                            false
                        }
                    };
                    (frames, write_failures, substituted, finished)
                }
                Some(Ok(None)) | None => (0, 0, 0, false),
                Some(Err(_)) => {
                    tracing::error!("Recording thread panicked");
                    messages.push("Recording thread panicked".to_string());
                    (0, 0, 0, false)
                }
            };

        let (audio_path, audio_duration) = self.stop_audio(&mut messages);

        let final_result = if video_ok {
            self.produce_final(&artifact, audio_path.as_deref())
        } else {
            Err(TarantinoError::write("No video artifact to finalize"))
        };
        let (final_path, mux_error) = match final_result {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Final recording ready");
                (Some(path), None)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Final artifact not produced; raw artifacts kept");
                messages.push(e.to_string());
                (None, Some(e.to_string()))
            }
        };

        self.log_drift(frames_written, audio_duration);

        let report = StopReport {
            artifact,
            final_path,
            audio_path,
            frames_written,
            write_failures,
            substituted_frames,
            duration: self.final_elapsed,
            audio_duration,
            mux_error,
        };
        self.report = Some(report.clone());
        self.publish((!messages.is_empty()).then(|| messages.join("; ")));
        Some(report)
    }

    /// Write the finished recording to `output`.
    ///
    /// Copies the final file when the container matches, otherwise merges or
    /// rewraps the raw artifacts again. Raw artifacts are never deleted.
    pub fn save(&self, output: &Path) -> SaveOutcome {
        if self.state != SessionState::Stopped {
            return SaveOutcome::failed("Nothing to save; stop the recording first");
        }
        let Some(report) = &self.report else {
            return SaveOutcome::failed("No recording available");
        };
        if !report.artifact.has_video() {
            return SaveOutcome::failed("The video artifact is missing");
        }
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return SaveOutcome::failed(format!("Cannot create {}: {e}", parent.display()));
            }
        }

        let wanted = extension_of(output);
        let copy_from = match &report.final_path {
            Some(final_path) if extension_of(final_path) == wanted => Some(final_path.clone()),
            _ if report.audio_path.is_none() && wanted == INTERMEDIATE_VIDEO_EXTENSION => {
                Some(report.artifact.video.clone())
            }
            _ => None,
        };

        let result = match copy_from {
            Some(source) if source == output => Ok(output.to_path_buf()),
            Some(source) => std::fs::copy(&source, output)
                .map(|_| output.to_path_buf())
                .map_err(TarantinoError::from),
            None => self
                .muxer
                .merge(&report.artifact.video, report.audio_path.as_deref(), output),
        };

        match result {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Recording saved");
                SaveOutcome::ok(&path)
            }
            Err(e) => {
                tracing::warn!(error = %e, output = %output.display(), "Save failed");
                SaveOutcome::failed(format!("Save failed: {e}"))
            }
        }
    }

    /// Back to a fresh Idle session, keeping config, scene and hub.
    fn reset(&mut self) {
        self.clock = None;
        self.worker = None;
        self.audio = None;
        self.artifact = None;
        self.report = None;
        self.final_elapsed = Duration::ZERO;
        self.paused.store(false, Ordering::SeqCst);
        self.stop_flag.store(false, Ordering::SeqCst);
        self.state = SessionState::Idle;
        self.publish(None);
    }

    /// Open the audio stream per the audio policy.
    ///
    /// `Ok(None)` means video-only.
    fn open_audio_input(&self) -> TarantinoResult<Option<Box<dyn AudioInput>>> {
        if !self.config.audio_enabled {
            return Ok(None);
        }
        match self.hub.backend().open_audio(
            self.config.audio_format,
            self.config.audio_settings.source,
            self.config.open_timeout,
        ) {
            Ok(input) => Ok(Some(input)),
            Err(e) if self.config.audio_required => {
                tracing::error!(error = %e, "Audio is required but unavailable");
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Audio unavailable, recording video only");
                self.publish(Some(format!("Audio unavailable, recording video only: {e}")));
                Ok(None)
            }
        }
    }

    fn start_audio_engine(
        &self,
        input: Box<dyn AudioInput>,
        artifact: &OutputArtifact,
    ) -> Option<AudioCaptureEngine> {
        let mut engine = AudioCaptureEngine::new(
            self.config.audio_format,
            self.config.audio_settings,
            artifact.audio.clone(),
        );
        match engine.start(input) {
            Ok(()) => Some(engine),
            Err(e) => {
                tracing::warn!(error = %e, "Audio engine failed to start, recording video only");
                self.publish(Some(format!("Audio engine failed to start: {e}")));
                None
            }
        }
    }

    fn stop_audio(&mut self, messages: &mut Vec<String>) -> (Option<PathBuf>, Option<Duration>) {
        let Some(mut audio) = self.audio.take() else {
            return (None, None);
        };
        let duration = audio.captured_duration();
        match audio.stop() {
            Ok(path) => (path, Some(duration)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to write audio artifact");
                messages.push(e.to_string());
                (None, Some(duration))
            }
        }
    }

    /// Merge, copy or rewrap the intermediate artifacts into the final file.
    fn produce_final(
        &self,
        artifact: &OutputArtifact,
        audio: Option<&Path>,
    ) -> TarantinoResult<PathBuf> {
        match audio {
            Some(audio) => self
                .muxer
                .merge(&artifact.video, Some(audio), &artifact.final_path),
            None if artifact.container() == INTERMEDIATE_VIDEO_EXTENSION => {
                std::fs::copy(&artifact.video, &artifact.final_path)?;
                Ok(artifact.final_path.clone())
            }
            None => self.muxer.merge(&artifact.video, None, &artifact.final_path),
        }
    }

    fn log_drift(&self, frames_written: u64, audio_duration: Option<Duration>) {
        let Some(audio_duration) = audio_duration else {
            return;
        };
        let measurement = DriftMeasurement {
            reference_ns: self.config.sink_config().pts_of(frames_written).as_nanos() as u64,
            measured_ns: audio_duration.as_nanos() as u64,
        };
        if measurement.exceeds_threshold_ms(DRIFT_WARN_MS) {
            tracing::warn!(drift_ms = measurement.drift_ms(), "Audio/video drift exceeds 100ms");
        } else {
            tracing::info!(drift_ms = measurement.drift_ms(), "Audio/video drift within threshold");
        }
    }

    fn publish(&self, message: Option<String>) {
        let state = self.state;
        self.status.send_modify(|status| {
            status.state = state;
            if message.is_some() || state == SessionState::Idle {
                status.message = message;
            }
        });
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if matches!(self.state, SessionState::Recording | SessionState::Paused) {
            tracing::warn!("Recording session dropped while active, stopping");
            self.stop();
        }
    }
}

/// The fixed-cadence frame loop.
struct RecordingLoop {
    composer: SceneComposer,
    sink: Box<dyn VideoSink>,
    clock: Arc<Mutex<RecordingClock>>,
    pacer: FramePacer,
    stop_flag: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    status: Arc<watch::Sender<SessionStatus>>,
}

/// Spawn failure carrying the loop back to the caller.
type SpawnError = (std::io::Error, Option<RecordingLoop>);

/// Release what a failed `start()` already set up: the lease, the sink and
/// the audio engine.
fn unwind_start(recording: Option<RecordingLoop>, audio: Option<AudioCaptureEngine>) {
    if let Some(recording) = recording {
        recording.abandon();
    }
    if let Some(mut audio) = audio {
        audio.abort();
    }
}

impl RecordingLoop {
    /// Run the loop on its own thread.
    ///
    /// The loop is handed over through a slot, so a failed spawn returns it
    /// instead of dropping it.
    fn spawn(self) -> Result<JoinHandle<Option<LoopOutput>>, SpawnError> {
        let slot = Arc::new(Mutex::new(Some(self)));
        let handoff = Arc::clone(&slot);
        std::thread::Builder::new()
            .name("tarantino-recorder".to_string())
            .spawn(move || {
                let recording = handoff.lock().take();
                recording.map(RecordingLoop::run)
            })
            .map_err(|e| (e, slot.lock().take()))
    }

    /// Close the sink and give the lease back without recording.
    fn abandon(self) {
        let RecordingLoop { composer, sink, .. } = self;
        if let Err(e) = sink.finish() {
            tracing::warn!(error = %e, "Failed to close unused video sink");
        }
        drop(composer);
    }

    fn run(mut self) -> LoopOutput {
        let mut write_failures = 0u64;
        while !self.stop_flag.load(Ordering::SeqCst) {
            let cycle = Instant::now();
            if self.paused.load(Ordering::SeqCst) {
                self.pacer.pace(cycle);
                continue;
            }

            let timestamp_ns = self.clock.lock().elapsed_ns();
            let frame = self.composer.compose(timestamp_ns, cycle);
            if let Err(e) = self.sink.write(&frame) {
                write_failures += 1;
                if write_failures == 1 || write_failures % 100 == 0 {
                    tracing::warn!(error = %e, failures = write_failures, "Frame write failed");
                }
                let message = format!("Frame write failed: {e}");
                self.status.send_modify(|status| status.message = Some(message));
            }

            self.pacer.pace(cycle);
        }

        tracing::debug!(
            frames = self.sink.frames_written(),
            substituted = self.composer.capture_failures(),
            "Recording loop exited"
        );
        LoopOutput {
            sink: self.sink,
            composer: self.composer,
            write_failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_bad_values() {
        let ok = SessionConfig::default();
        assert!(ok.validate().is_ok());

        let cases = [
            SessionConfig {
                fps: 0,
                ..Default::default()
            },
            SessionConfig {
                bitrate_kbps: 0,
                ..Default::default()
            },
            SessionConfig {
                resolution: Resolution::new(0, 720),
                ..Default::default()
            },
            SessionConfig {
                container: "gif".to_string(),
                ..Default::default()
            },
            SessionConfig {
                name: "../escape".to_string(),
                ..Default::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(TarantinoError::Config { .. })),
                "{config:?} should be rejected"
            );
        }
    }

    #[test]
    fn audio_values_only_checked_when_enabled() {
        let mut config = SessionConfig {
            audio_format: AudioFormat {
                channels: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.audio_enabled = false;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unwinding_a_failed_start_releases_everything() {
        use crate::hub::HubConfig;
        use crate::synthetic::{read_frame_log, SyntheticBackend, SyntheticOptions, FRAME_LOG_HEADER};
        use crate::DeviceBackend;
        use tarantino_audio::ToneInput;

        let dir = tempfile::tempdir().unwrap();
        let backend = SyntheticBackend::new(SyntheticOptions::default());
        let resolution = Resolution::new(32, 18);
        let hub = SourceHub::new(
            Arc::new(backend.clone()),
            HubConfig {
                resolution,
                screen_cache_ttl: Duration::from_millis(10),
                open_timeout: Duration::from_millis(100),
                camera_index: 0,
            },
        );
        let scene = Arc::new(LiveScene::new(Default::default()));
        let lease = hub.acquire(false).unwrap();
        let video = dir.path().join("clip.video.mkv");
        let sink_config = VideoSinkConfig {
            resolution,
            fps: 10,
            bitrate_kbps: 500,
        };
        let sink = backend.open_video_sink(&video, &sink_config).unwrap();
        let (status, _) = watch::channel(SessionStatus::default());
        let recording = RecordingLoop {
            composer: SceneComposer::new(scene, lease),
            sink,
            clock: Arc::new(Mutex::new(RecordingClock::start())),
            pacer: FramePacer::new(10),
            stop_flag: Arc::new(AtomicBool::new(true)),
            paused: Arc::new(AtomicBool::new(false)),
            status: Arc::new(status),
        };

        let format = AudioFormat::default();
        let audio_path = dir.path().join("clip.audio.wav");
        let mut audio = AudioCaptureEngine::new(format, AudioSettings::default(), &audio_path);
        audio
            .start(Box::new(ToneInput::new(format, 440.0, 0.5)))
            .unwrap();

        unwind_start(Some(recording), Some(audio));

        assert_eq!(hub.lease_count(), 0);
        assert_eq!(backend.counters().screens_open(), 0);
        let header = std::fs::read_to_string(&video).unwrap();
        assert!(header.starts_with(FRAME_LOG_HEADER));
        assert!(read_frame_log(&video).unwrap().is_empty());
        assert!(!audio_path.exists());
    }

    #[test]
    fn from_app_config_parses_resolution() {
        let mut app = AppConfig::default();
        app.recording.resolution = "1280x720".to_string();
        let config = SessionConfig::from_app_config(&app, "take").unwrap();
        assert_eq!(config.resolution, Resolution::new(1280, 720));
        assert_eq!(config.name, "take");

        app.recording.resolution = "wide".to_string();
        assert!(SessionConfig::from_app_config(&app, "take").is_err());
    }
}
