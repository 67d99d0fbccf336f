//! Live preview loop.
//!
//! Runs the same composition chain as the recording on its own thread and
//! cadence. Frames are published through a single-slot `watch` cell: readers
//! always see the newest frame and a slow reader just misses some.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use image::imageops::FilterType;
use tarantino_common::clock::FramePacer;
use tarantino_common::config::PreviewDefaults;
use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::FrameBuffer;
use tokio::sync::watch;

use crate::hub::SourceHub;
use crate::scene::{LiveScene, SceneComposer};

/// Invoked with every published preview frame, on the preview thread.
pub type PreviewCallback = Arc<dyn Fn(&Arc<FrameBuffer>) + Send + Sync>;

/// Latest preview frame, `None` until the first one is published.
pub type PreviewFrame = Option<Arc<FrameBuffer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewConfig {
    pub fps: u32,
    /// Frames wider than this are downscaled, aspect preserved.
    pub max_width: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self::from(&PreviewDefaults::default())
    }
}

impl From<&PreviewDefaults> for PreviewConfig {
    fn from(defaults: &PreviewDefaults) -> Self {
        Self {
            fps: defaults.fps.max(1),
            max_width: defaults.max_width,
        }
    }
}

/// Independent, variable-rate preview producer.
pub struct PreviewScheduler {
    hub: Arc<SourceHub>,
    scene: Arc<LiveScene>,
    max_width: u32,
    fps: Arc<AtomicU32>,
    sender: Arc<watch::Sender<PreviewFrame>>,
    callback: Option<PreviewCallback>,
    stop_flag: Arc<AtomicBool>,
    published: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl PreviewScheduler {
    pub fn new(hub: Arc<SourceHub>, scene: Arc<LiveScene>, config: PreviewConfig) -> Self {
        let (sender, _) = watch::channel(None);
        Self {
            hub,
            scene,
            max_width: config.max_width,
            fps: Arc::new(AtomicU32::new(config.fps.max(1))),
            sender: Arc::new(sender),
            callback: None,
            stop_flag: Arc::new(AtomicBool::new(false)),
            published: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    /// Call `callback` at preview cadence. Takes effect on the next start.
    pub fn with_callback(mut self, callback: impl Fn(&Arc<FrameBuffer>) + Send + Sync + 'static) -> Self {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Change the preview rate; the running loop picks it up next cycle.
    pub fn set_fps(&self, fps: u32) {
        self.fps.store(fps.max(1), Ordering::SeqCst);
        tracing::debug!(fps = fps.max(1), "Preview rate changed");
    }

    pub fn fps(&self) -> u32 {
        self.fps.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<PreviewFrame> {
        self.sender.subscribe()
    }

    /// Most recent preview frame.
    pub fn latest(&self) -> PreviewFrame {
        self.sender.borrow().clone()
    }

    pub fn frames_published(&self) -> u64 {
        self.published.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Take a device lease and spawn the preview thread.
    pub fn start(&mut self) -> TarantinoResult<()> {
        if self.worker.is_some() {
            return Err(TarantinoError::invalid_state("Preview already running"));
        }
        let lease = self.hub.acquire(self.scene.snapshot().overlay.shows_camera())?;
        let composer = SceneComposer::new(Arc::clone(&self.scene), lease);

        self.stop_flag.store(false, Ordering::SeqCst);
        let preview = PreviewLoop {
            composer,
            max_width: self.max_width,
            fps: Arc::clone(&self.fps),
            sender: Arc::clone(&self.sender),
            callback: self.callback.clone(),
            stop_flag: Arc::clone(&self.stop_flag),
            published: Arc::clone(&self.published),
        };
        let worker = std::thread::Builder::new()
            .name("tarantino-preview".to_string())
            .spawn(move || preview.run())?;
        tracing::info!(fps = self.fps(), max_width = self.max_width, "Preview started");
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the thread and release its lease. Does nothing when not running.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.stop_flag.store(true, Ordering::SeqCst);
        if worker.join().is_err() {
            tracing::error!("Preview thread panicked");
        }
        tracing::info!(frames = self.frames_published(), "Preview stopped");
    }
}

impl Drop for PreviewScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PreviewLoop {
    composer: SceneComposer,
    max_width: u32,
    fps: Arc<AtomicU32>,
    sender: Arc<watch::Sender<PreviewFrame>>,
    callback: Option<PreviewCallback>,
    stop_flag: Arc<AtomicBool>,
    published: Arc<AtomicU64>,
}

impl PreviewLoop {
    fn run(mut self) {
        let epoch = Instant::now();
        while !self.stop_flag.load(Ordering::SeqCst) {
            let cycle = Instant::now();
            let timestamp_ns = cycle.saturating_duration_since(epoch).as_nanos() as u64;
            let frame = self.composer.compose(timestamp_ns, cycle);

            let target = frame.resolution().fit_width(self.max_width);
            let frame = if target == frame.resolution() {
                frame
            } else {
                frame.resized(target, FilterType::Triangle)
            };
            let frame = Arc::new(frame);
            self.sender.send_replace(Some(Arc::clone(&frame)));
            self.published.fetch_add(1, Ordering::SeqCst);
            if let Some(callback) = &self.callback {
                callback(&frame);
            }

            FramePacer::new(self.fps.load(Ordering::SeqCst)).pace(cycle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tarantino_frame_model::Resolution;

    use crate::hub::HubConfig;
    use crate::synthetic::{SyntheticBackend, SyntheticOptions};

    fn hub() -> Arc<SourceHub> {
        SourceHub::new(
            Arc::new(SyntheticBackend::new(SyntheticOptions::default())),
            HubConfig {
                resolution: Resolution::new(128, 72),
                screen_cache_ttl: Duration::from_millis(500),
                open_timeout: Duration::from_millis(100),
                camera_index: 0,
            },
        )
    }

    #[test]
    fn publishes_downscaled_latest_frame() {
        let hub = hub();
        let mut preview = PreviewScheduler::new(
            Arc::clone(&hub),
            Arc::new(LiveScene::default()),
            PreviewConfig {
                fps: 50,
                max_width: 64,
            },
        );
        assert!(preview.latest().is_none());
        preview.start().unwrap();
        std::thread::sleep(Duration::from_millis(200));
        preview.stop();

        let latest = preview.latest().expect("frame published");
        assert_eq!(latest.resolution(), Resolution::new(64, 36));
        assert!(preview.frames_published() >= 2);
        assert_eq!(hub.lease_count(), 0);
    }

    #[test]
    fn callback_runs_at_preview_cadence() {
        let calls = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&calls);
        let mut preview =
            PreviewScheduler::new(hub(), Arc::new(LiveScene::default()), PreviewConfig::default())
                .with_callback(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
        preview.set_fps(40);
        assert_eq!(preview.fps(), 40);
        preview.start().unwrap();
        assert!(preview.start().is_err());
        std::thread::sleep(Duration::from_millis(150));
        preview.stop();
        assert_eq!(calls.load(Ordering::SeqCst), preview.frames_published());
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }
}
