//! Audio capture engine: one worker thread per recording.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::{AudioFormat, AudioSettings};

use crate::conditioning::{condition_chunk, NoiseGateConfig};
use crate::wav::write_wav;

/// Back-off after a failed or empty read.
const READ_RETRY_DELAY: Duration = Duration::from_millis(10);

/// A source of interleaved 16-bit PCM.
pub trait AudioInput: Send {
    /// Read up to `max_samples` interleaved samples, blocking until some are
    /// available. An empty chunk means nothing was ready yet.
    fn read_chunk(&mut self, max_samples: usize) -> TarantinoResult<Vec<i16>>;

    /// PCM layout produced by this input.
    fn format(&self) -> AudioFormat;

    /// Release the underlying stream.
    fn close(&mut self) {}

    /// Input name for logs.
    fn name(&self) -> &str;
}

/// State shared between the engine handle and its worker thread.
struct Shared {
    settings: Mutex<AudioSettings>,
    samples: Mutex<Vec<i16>>,
    stop: AtomicBool,
    paused: AtomicBool,
    chunks: AtomicU64,
    read_failures: AtomicU64,
}

/// Captures and conditions audio on a dedicated thread until stopped.
pub struct AudioCaptureEngine {
    format: AudioFormat,
    gate: NoiseGateConfig,
    output: PathBuf,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Box<dyn AudioInput>>>,
}

impl AudioCaptureEngine {
    /// Engine writing its artifact to `output` when stopped.
    pub fn new(format: AudioFormat, settings: AudioSettings, output: impl Into<PathBuf>) -> Self {
        Self {
            format,
            gate: NoiseGateConfig::default(),
            output: output.into(),
            shared: Arc::new(Shared {
                settings: Mutex::new(settings),
                samples: Mutex::new(Vec::new()),
                stop: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                chunks: AtomicU64::new(0),
                read_failures: AtomicU64::new(0),
            }),
            worker: None,
        }
    }

    pub fn with_noise_gate(mut self, gate: NoiseGateConfig) -> Self {
        self.gate = gate;
        self
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Spawn the capture thread reading from `input`.
    pub fn start(&mut self, input: Box<dyn AudioInput>) -> TarantinoResult<()> {
        if self.worker.is_some() {
            return Err(TarantinoError::invalid_state("Audio engine already running"));
        }
        if input.format() != self.format {
            tracing::warn!(
                input = input.name(),
                expected = ?self.format,
                actual = ?input.format(),
                "Audio input format differs from session format"
            );
        }

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.samples.lock().clear();

        let shared = Arc::clone(&self.shared);
        let chunk_samples = self.format.chunk_samples();
        let gate = self.gate;
        let name = input.name().to_string();
        let worker = std::thread::Builder::new()
            .name("tarantino-audio".to_string())
            .spawn(move || capture_loop(input, shared, chunk_samples, gate))
            .map_err(|e| TarantinoError::stream(format!("Failed to spawn audio thread: {e}")))?;

        tracing::info!(
            input = %name,
            sample_rate = self.format.sample_rate,
            channels = self.format.channels,
            "Audio capture started"
        );
        self.worker = Some(worker);
        Ok(())
    }

    /// Discard incoming chunks until [`resume`](Self::resume).
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Replace the conditioning settings; applies from the next chunk.
    pub fn update_settings(&self, settings: AudioSettings) {
        *self.shared.settings.lock() = settings;
    }

    /// Interleaved samples accumulated so far.
    pub fn samples_captured(&self) -> usize {
        self.shared.samples.lock().len()
    }

    /// Duration of audio accumulated so far.
    pub fn captured_duration(&self) -> Duration {
        self.format.duration_of(self.samples_captured())
    }

    /// Stop the thread and write the WAV artifact.
    ///
    /// Returns `None` when no capture thread was running.
    pub fn stop(&mut self) -> TarantinoResult<Option<PathBuf>> {
        let Some(worker) = self.worker.take() else {
            return Ok(None);
        };
        self.shared.stop.store(true, Ordering::SeqCst);
        match worker.join() {
            Ok(mut input) => input.close(),
            Err(_) => tracing::error!("Audio capture thread panicked"),
        }

        let samples = std::mem::take(&mut *self.shared.samples.lock());
        tracing::info!(
            chunks = self.shared.chunks.load(Ordering::Relaxed),
            read_failures = self.shared.read_failures.load(Ordering::Relaxed),
            samples = samples.len(),
            "Audio capture stopped"
        );
        write_wav(&self.output, &self.format, &samples).map(Some)
    }

    /// Stop the thread and close the input without writing an artifact.
    pub fn abort(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::SeqCst);
        match worker.join() {
            Ok(mut input) => input.close(),
            Err(_) => tracing::error!("Audio capture thread panicked"),
        }
        self.shared.samples.lock().clear();
        tracing::info!("Audio capture aborted");
    }
}

impl Drop for AudioCaptureEngine {
    fn drop(&mut self) {
        self.abort();
    }
}

fn capture_loop(
    mut input: Box<dyn AudioInput>,
    shared: Arc<Shared>,
    chunk_samples: usize,
    gate: NoiseGateConfig,
) -> Box<dyn AudioInput> {
    while !shared.stop.load(Ordering::SeqCst) {
        match input.read_chunk(chunk_samples) {
            Ok(chunk) if chunk.is_empty() => std::thread::sleep(READ_RETRY_DELAY),
            Ok(chunk) => {
                if shared.paused.load(Ordering::SeqCst) {
                    continue;
                }
                let settings = *shared.settings.lock();
                let conditioned = condition_chunk(&chunk, &settings, &gate);
                shared.samples.lock().extend_from_slice(&conditioned);
                shared.chunks.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                let failures = shared.read_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures == 1 || failures % 100 == 0 {
                    tracing::warn!(error = %e, failures, "Audio chunk read failed, retrying");
                }
                std::thread::sleep(READ_RETRY_DELAY);
            }
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Scripted input: yields queued results, then empty chunks.
    struct ScriptedInput {
        script: VecDeque<TarantinoResult<Vec<i16>>>,
        closed: Arc<AtomicBool>,
    }

    impl AudioInput for ScriptedInput {
        fn read_chunk(&mut self, _max: usize) -> TarantinoResult<Vec<i16>> {
            self.script.pop_front().unwrap_or_else(|| Ok(Vec::new()))
        }

        fn format(&self) -> AudioFormat {
            AudioFormat::default()
        }

        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn wait_for(engine: &AudioCaptureEngine, samples: usize) {
        for _ in 0..200 {
            if engine.samples_captured() >= samples {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn failed_reads_do_not_end_the_loop() {
        let dir = tempfile::tempdir().unwrap();
        let closed = Arc::new(AtomicBool::new(false));
        let input = ScriptedInput {
            script: VecDeque::from(vec![
                Ok(vec![100, 200]),
                Err(TarantinoError::stream("xrun")),
                Ok(vec![300, 400]),
            ]),
            closed: Arc::clone(&closed),
        };
        let mut engine =
            AudioCaptureEngine::new(AudioFormat::default(), AudioSettings::default(), dir.path().join("a.wav"));
        engine.start(Box::new(input)).unwrap();
        wait_for(&engine, 4);

        let path = engine.stop().unwrap().expect("artifact written");
        assert!(closed.load(Ordering::SeqCst));
        let samples: Vec<i16> = hound::WavReader::open(&path)
            .unwrap()
            .into_samples()
            .map(Result::unwrap)
            .collect();
        assert_eq!(samples, vec![100, 200, 300, 400]);
    }

    #[test]
    fn stop_without_start_returns_none() {
        let mut engine = AudioCaptureEngine::new(
            AudioFormat::default(),
            AudioSettings::default(),
            "/nonexistent/a.wav",
        );
        assert!(engine.stop().unwrap().is_none());
    }

    #[test]
    fn starting_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut engine =
            AudioCaptureEngine::new(AudioFormat::default(), AudioSettings::default(), dir.path().join("a.wav"));
        let make = || ScriptedInput {
            script: VecDeque::new(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        engine.start(Box::new(make())).unwrap();
        let err = engine.start(Box::new(make())).unwrap_err();
        assert!(matches!(err, TarantinoError::InvalidState { .. }));
        engine.stop().unwrap();
    }

    #[test]
    fn custom_noise_gate_attenuates_quiet_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let input = ScriptedInput {
            script: VecDeque::from(vec![Ok(vec![1000, -1000])]),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let settings = AudioSettings {
            noise_suppression: true,
            ..Default::default()
        };
        let mut engine = AudioCaptureEngine::new(AudioFormat::default(), settings, dir.path().join("a.wav"))
            .with_noise_gate(NoiseGateConfig {
                threshold_dbfs: -10.0,
                attenuation_db: 20.0,
            });
        engine.start(Box::new(input)).unwrap();
        wait_for(&engine, 2);

        let path = engine.stop().unwrap().expect("artifact written");
        let samples: Vec<i16> = hound::WavReader::open(&path)
            .unwrap()
            .into_samples()
            .map(Result::unwrap)
            .collect();
        assert_eq!(samples, vec![100, -100]);
    }

    #[test]
    fn paused_engine_reports_its_state() {
        let dir = tempfile::tempdir().unwrap();
        let input = ScriptedInput {
            script: VecDeque::new(),
            closed: Arc::new(AtomicBool::new(false)),
        };
        let mut engine =
            AudioCaptureEngine::new(AudioFormat::default(), AudioSettings::default(), dir.path().join("a.wav"));
        engine.start(Box::new(input)).unwrap();
        assert!(!engine.is_paused());
        engine.pause();
        assert!(engine.is_paused());
        engine.resume();
        assert!(!engine.is_paused());
        engine.stop().unwrap();
    }

    #[test]
    fn abort_closes_input_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("a.wav");
        let closed = Arc::new(AtomicBool::new(false));
        let input = ScriptedInput {
            script: VecDeque::from(vec![Ok(vec![1, 2, 3, 4])]),
            closed: Arc::clone(&closed),
        };
        let mut engine =
            AudioCaptureEngine::new(AudioFormat::default(), AudioSettings::default(), &output);
        engine.start(Box::new(input)).unwrap();
        wait_for(&engine, 4);

        engine.abort();
        assert!(closed.load(Ordering::SeqCst));
        assert!(!engine.is_running());
        assert_eq!(engine.samples_captured(), 0);
        assert!(!output.exists());
        assert!(engine.stop().unwrap().is_none());
    }

    #[test]
    fn dropping_a_running_engine_closes_its_input() {
        let dir = tempfile::tempdir().unwrap();
        let closed = Arc::new(AtomicBool::new(false));
        let input = ScriptedInput {
            script: VecDeque::new(),
            closed: Arc::clone(&closed),
        };
        let mut engine =
            AudioCaptureEngine::new(AudioFormat::default(), AudioSettings::default(), dir.path().join("a.wav"));
        engine.start(Box::new(input)).unwrap();
        drop(engine);
        assert!(closed.load(Ordering::SeqCst));
    }
}
