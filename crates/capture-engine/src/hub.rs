//! Shared capture devices behind reference-counted leases.
//!
//! The recording loop and the preview loop each hold a [`SourceLease`]. The
//! first lease opens the screen (and the camera when asked), the last release
//! closes everything. Screen grabs go through one [`ScreenSource`], so both
//! loops share its screenshot cache.
//!
//! A camera toggled on mid-session is opened on a background thread; frame
//! loops never wait on a device open.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tarantino_common::config::DeviceDefaults;
use tarantino_common::error::{TarantinoError, TarantinoResult};
use tarantino_frame_model::{FrameBuffer, Resolution};

use crate::devices::DeviceBackend;
use crate::source::{CameraSource, CaptureSource, ScreenCacheStats, ScreenSource};

/// Wait between attempts to open a camera that failed to open mid-session.
const CAMERA_RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Device parameters of a hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Resolution screen frames are resampled to.
    pub resolution: Resolution,
    pub screen_cache_ttl: Duration,
    pub open_timeout: Duration,
    pub camera_index: u32,
}

impl HubConfig {
    pub fn from_defaults(resolution: Resolution, devices: &DeviceDefaults) -> Self {
        Self {
            resolution,
            screen_cache_ttl: Duration::from_millis(devices.screen_cache_ms),
            open_timeout: Duration::from_millis(devices.open_timeout_ms),
            camera_index: devices.camera_index,
        }
    }
}

#[derive(Default)]
struct HubState {
    leases: usize,
    screen: Option<Arc<Mutex<ScreenSource>>>,
    camera: Option<Arc<Mutex<CameraSource>>>,
    camera_retry_at: Option<Instant>,
    /// A background camera open is in flight.
    camera_opening: bool,
    /// Bumped whenever the last lease is released.
    generation: u64,
}

/// Owner of the shared screen source and camera.
pub struct SourceHub {
    backend: Arc<dyn DeviceBackend>,
    config: HubConfig,
    state: Mutex<HubState>,
}

impl SourceHub {
    pub fn new(backend: Arc<dyn DeviceBackend>, config: HubConfig) -> Arc<Self> {
        Arc::new(Self {
            backend,
            config,
            state: Mutex::new(HubState::default()),
        })
    }

    pub fn backend(&self) -> &Arc<dyn DeviceBackend> {
        &self.backend
    }

    pub fn config(&self) -> HubConfig {
        self.config
    }

    pub fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    /// Number of outstanding leases.
    pub fn lease_count(&self) -> usize {
        self.state.lock().leases
    }

    pub fn screen_open(&self) -> bool {
        self.state.lock().screen.is_some()
    }

    pub fn camera_open(&self) -> bool {
        self.state.lock().camera.is_some()
    }

    pub fn screen_stats(&self) -> Option<ScreenCacheStats> {
        let screen = self.state.lock().screen.clone()?;
        let stats = screen.lock().stats();
        Some(stats)
    }

    /// Take a lease, opening devices as needed.
    ///
    /// The camera is opened without holding the device lock, so loops running
    /// on other leases keep capturing meanwhile. On failure nothing opened by
    /// this call stays open and no lease is counted.
    pub fn acquire(self: &Arc<Self>, with_camera: bool) -> TarantinoResult<SourceLease> {
        let mut lease = {
            let mut state = self.state.lock();
            if state.screen.is_none() {
                let grabber = self.backend.open_screen(self.config.open_timeout)?;
                state.screen = Some(Arc::new(Mutex::new(ScreenSource::new(
                    grabber,
                    self.config.resolution,
                    self.config.screen_cache_ttl,
                ))));
            }
            state.leases += 1;
            tracing::debug!(leases = state.leases, "Source lease acquired");
            SourceLease {
                hub: Arc::clone(self),
                released: false,
            }
        };

        if with_camera && !self.camera_open() {
            match self.open_camera() {
                Ok(camera) => self.install_camera(camera),
                Err(e) => {
                    lease.release();
                    tracing::warn!(error = %e, "Device open failed; released devices opened by this attempt");
                    return Err(e);
                }
            }
        }
        Ok(lease)
    }

    /// Keep `camera` unless another open won the race.
    fn install_camera(&self, mut camera: CameraSource) {
        let mut state = self.state.lock();
        if state.camera.is_none() {
            state.camera = Some(Arc::new(Mutex::new(camera)));
            state.camera_retry_at = None;
            return;
        }
        drop(state);
        camera.close();
    }

    fn open_camera(&self) -> TarantinoResult<CameraSource> {
        let index = self.config.camera_index;
        let device = self.backend.open_camera(index, self.config.open_timeout)?;
        tracing::info!(camera = index, "Camera opened");
        Ok(CameraSource::new(device, index))
    }

    fn release(&self) {
        let mut state = self.state.lock();
        state.leases = state.leases.saturating_sub(1);
        tracing::debug!(leases = state.leases, "Source lease released");
        if state.leases > 0 {
            return;
        }
        if let Some(screen) = state.screen.take() {
            screen.lock().close();
        }
        if let Some(camera) = state.camera.take() {
            camera.lock().close();
        }
        state.camera_retry_at = None;
        state.camera_opening = false;
        state.generation = state.generation.wrapping_add(1);
        tracing::info!("Capture devices closed");
    }

    fn capture_screen(&self, timestamp_ns: u64) -> TarantinoResult<FrameBuffer> {
        let screen = self
            .state
            .lock()
            .screen
            .clone()
            .ok_or_else(|| TarantinoError::capture("Screen source is not open"))?;
        let frame = screen.lock().capture(timestamp_ns);
        frame
    }

    /// Read the camera.
    ///
    /// A camera toggled on mid-session yields `None` until the background
    /// open finishes.
    fn read_camera(self: &Arc<Self>, timestamp_ns: u64) -> Option<FrameBuffer> {
        let camera = {
            let mut state = self.state.lock();
            if state.camera.is_none() {
                self.request_camera(&mut state);
            }
            state.camera.clone()
        }?;
        let frame = camera.lock().capture(timestamp_ns).ok();
        frame
    }

    /// Start a background camera open unless one is running or backing off.
    fn request_camera(self: &Arc<Self>, state: &mut HubState) {
        if state.leases == 0 || state.camera_opening {
            return;
        }
        if state.camera_retry_at.is_some_and(|at| Instant::now() < at) {
            return;
        }
        state.camera_opening = true;
        let hub = Arc::clone(self);
        let generation = state.generation;
        let spawned = std::thread::Builder::new()
            .name("tarantino-camera-open".to_string())
            .spawn(move || hub.finish_camera_open(generation));
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "Failed to spawn camera opener, retrying later");
            state.camera_opening = false;
            state.camera_retry_at = Some(Instant::now() + CAMERA_RETRY_BACKOFF);
        }
    }

    /// Body of the opener thread.
    fn finish_camera_open(&self, generation: u64) {
        let result = self.open_camera();
        let mut state = self.state.lock();
        if state.generation != generation {
            drop(state);
            if let Ok(mut camera) = result {
                camera.close();
                tracing::debug!("Leases ended during camera open, closed it again");
            }
            return;
        }
        state.camera_opening = false;
        match result {
            Ok(camera) if state.camera.is_none() => {
                state.camera = Some(Arc::new(Mutex::new(camera)));
                state.camera_retry_at = None;
            }
            Ok(mut camera) => {
                drop(state);
                camera.close();
            }
            Err(e) => {
                tracing::warn!(error = %e, "Camera unavailable, retrying later");
                state.camera_retry_at = Some(Instant::now() + CAMERA_RETRY_BACKOFF);
            }
        }
    }
}

/// A claim on the hub's devices, released exactly once (explicitly or on drop).
pub struct SourceLease {
    hub: Arc<SourceHub>,
    released: bool,
}

impl SourceLease {
    pub fn hub(&self) -> &Arc<SourceHub> {
        &self.hub
    }

    pub fn resolution(&self) -> Resolution {
        self.hub.resolution()
    }

    /// Screen frame at the hub resolution, from the shared cache when fresh.
    pub fn capture_screen(&self, timestamp_ns: u64) -> TarantinoResult<FrameBuffer> {
        self.hub.capture_screen(timestamp_ns)
    }

    /// Camera frame, or `None` when no frame could be read.
    pub fn read_camera(&self, timestamp_ns: u64) -> Option<FrameBuffer> {
        self.hub.read_camera(timestamp_ns)
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Give the lease back. Later calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.hub.release();
        }
    }
}

impl Drop for SourceLease {
    fn drop(&mut self) {
        self.release();
    }
}
