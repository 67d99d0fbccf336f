//! Live scene settings and the per-frame composition chain.
//!
//! [`LiveScene`] holds the controls a user changes while recording. Each
//! frame, a [`SceneComposer`] copies one snapshot under a short lock and runs
//! capture, effects, compositing and transition on it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use image::imageops::FilterType;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tarantino_common::error::TarantinoResult;
use tarantino_frame_model::{
    EffectParameters, FrameBuffer, OverlayState, Resolution, SourceTag, TransitionSettings,
};
use tarantino_processing_core::EffectPipeline;
use tarantino_render_engine::{compose, TransitionEngine};

use crate::hub::SourceLease;

/// Everything that shapes the composite, as one copyable value.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub effects: EffectParameters,
    pub overlay: OverlayState,
    pub transition: TransitionSettings,
}

impl SceneConfig {
    pub fn validate(&self) -> TarantinoResult<()> {
        self.effects.validate()?;
        self.overlay.validate()?;
        self.transition.validate()
    }

    /// Source configuration; a change of it arms a transition.
    fn source_signature(&self) -> (bool, bool) {
        (self.overlay.enabled, self.overlay.fills_frame)
    }
}

/// Scene settings shared between the control surface and the frame loops.
#[derive(Debug, Default)]
pub struct LiveScene {
    config: Mutex<SceneConfig>,
    revision: AtomicU64,
}

impl LiveScene {
    pub fn new(config: SceneConfig) -> Self {
        Self {
            config: Mutex::new(config),
            revision: AtomicU64::new(0),
        }
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> SceneConfig {
        *self.config.lock()
    }

    /// Number of accepted updates.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Apply `change` to a copy and store it if it validates.
    ///
    /// A rejected change leaves the scene untouched.
    pub fn update(&self, change: impl FnOnce(&mut SceneConfig)) -> TarantinoResult<()> {
        let mut config = self.config.lock();
        let mut next = *config;
        change(&mut next);
        next.validate()?;
        *config = next;
        self.revision.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_effects(&self, effects: EffectParameters) -> TarantinoResult<()> {
        self.update(|scene| scene.effects = effects)
    }

    pub fn set_transition(&self, transition: TransitionSettings) -> TarantinoResult<()> {
        self.update(|scene| scene.transition = transition)
    }

    pub fn set_overlay(&self, overlay: OverlayState) -> TarantinoResult<()> {
        self.update(|scene| scene.overlay = overlay)
    }

    /// Show or hide the camera overlay.
    pub fn set_camera_enabled(&self, enabled: bool) -> TarantinoResult<()> {
        self.update(|scene| scene.overlay.enabled = enabled)
    }

    /// Switch between the normal layout and the overlay filling the frame.
    pub fn set_only_overlay(&self, fills_frame: bool) -> TarantinoResult<()> {
        self.update(|scene| scene.overlay.fills_frame = fills_frame)
    }

    pub fn move_overlay(&self, x: i32, y: i32) -> TarantinoResult<()> {
        self.update(|scene| {
            scene.overlay.x = x;
            scene.overlay.y = y;
        })
    }

    pub fn set_overlay_scale(&self, scale: f32) -> TarantinoResult<()> {
        self.update(|scene| scene.overlay.scale = scale)
    }
}

/// Capture, effects, compositing and transition for one frame loop.
///
/// Owns its lease; dropping the composer releases the devices it used.
pub struct SceneComposer {
    scene: Arc<LiveScene>,
    lease: SourceLease,
    resolution: Resolution,
    effects: EffectPipeline,
    transition: TransitionEngine,
    last_base: Option<FrameBuffer>,
    last_overlay: Option<FrameBuffer>,
    last_signature: Option<(bool, bool)>,
    capture_failures: u64,
    frames: u64,
}

impl SceneComposer {
    pub fn new(scene: Arc<LiveScene>, lease: SourceLease) -> Self {
        let resolution = lease.resolution();
        let transition = TransitionEngine::new(scene.snapshot().transition);
        Self {
            scene,
            lease,
            resolution,
            effects: EffectPipeline::new(),
            transition,
            last_base: None,
            last_overlay: None,
            last_signature: None,
            capture_failures: 0,
            frames: 0,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn lease(&self) -> &SourceLease {
        &self.lease
    }

    /// Screen frames that had to be substituted.
    pub fn capture_failures(&self) -> u64 {
        self.capture_failures
    }

    pub fn frames_composed(&self) -> u64 {
        self.frames
    }

    /// Whether a transition is blending the current frames.
    pub fn is_transitioning(&self) -> bool {
        self.transition.is_armed()
    }

    /// Build the frame for `timestamp_ns`.
    pub fn compose(&mut self, timestamp_ns: u64, now: Instant) -> FrameBuffer {
        let scene = self.scene.snapshot();

        let base = self.capture_base(timestamp_ns);
        let overlay = if scene.overlay.shows_camera() {
            self.capture_overlay(timestamp_ns)
        } else {
            self.last_overlay = None;
            None
        };

        let base = self.effects.apply(base, &scene.effects);
        let overlay = overlay.map(|frame| self.effects.apply(frame, &scene.effects));
        let composite = compose(base, overlay, &scene.overlay);

        self.transition.set_settings(scene.transition);
        let signature = scene.source_signature();
        if self.last_signature.is_some_and(|last| last != signature) {
            let armed = self.transition.arm(now);
            tracing::debug!(
                camera = signature.0,
                only_overlay = signature.1,
                armed,
                "Source configuration changed"
            );
        }
        self.last_signature = Some(signature);

        self.frames += 1;
        self.transition.process(composite, now)
    }

    fn capture_base(&mut self, timestamp_ns: u64) -> FrameBuffer {
        match self.lease.capture_screen(timestamp_ns) {
            Ok(frame) => {
                let frame = if frame.resolution() == self.resolution {
                    frame
                } else {
                    frame.resized(self.resolution, FilterType::Lanczos3)
                };
                self.last_base = Some(frame.clone());
                frame
            }
            Err(e) => {
                self.capture_failures += 1;
                if self.capture_failures == 1 || self.capture_failures % 100 == 0 {
                    tracing::warn!(
                        error = %e,
                        failures = self.capture_failures,
                        "Screen capture failed, reusing last frame"
                    );
                }
                match &self.last_base {
                    Some(last) => last.clone().with_timestamp(timestamp_ns),
                    None => FrameBuffer::blank(self.resolution, timestamp_ns, SourceTag::Screen),
                }
            }
        }
    }

    fn capture_overlay(&mut self, timestamp_ns: u64) -> Option<FrameBuffer> {
        match self.lease.read_camera(timestamp_ns) {
            Some(frame) => {
                self.last_overlay = Some(frame.clone());
                Some(frame)
            }
            None => self
                .last_overlay
                .clone()
                .map(|frame| frame.with_timestamp(timestamp_ns)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tarantino_frame_model::TransitionKind;

    use crate::hub::{HubConfig, SourceHub};
    use crate::synthetic::{SyntheticBackend, SyntheticOptions};

    fn composer(scene: &Arc<LiveScene>) -> SceneComposer {
        let hub = SourceHub::new(
            Arc::new(SyntheticBackend::new(SyntheticOptions::default())),
            HubConfig {
                resolution: Resolution::new(64, 36),
                screen_cache_ttl: Duration::from_millis(500),
                open_timeout: Duration::from_millis(100),
                camera_index: 0,
            },
        );
        let lease = hub.acquire(false).unwrap();
        SceneComposer::new(Arc::clone(scene), lease)
    }

    #[test]
    fn rejected_update_keeps_previous_scene() {
        let scene = LiveScene::new(SceneConfig::default());
        assert!(scene.set_overlay_scale(0.0).is_err());
        assert_eq!(scene.snapshot().overlay.scale, 1.0);
        assert_eq!(scene.revision(), 0);
        scene.move_overlay(5, 6).unwrap();
        assert_eq!((scene.snapshot().overlay.x, scene.snapshot().overlay.y), (5, 6));
        assert_eq!(scene.revision(), 1);
    }

    #[test]
    fn composes_at_hub_resolution() {
        let scene = Arc::new(LiveScene::default());
        let mut composer = composer(&scene);
        let frame = composer.compose(42, Instant::now());
        assert_eq!(frame.resolution(), Resolution::new(64, 36));
        assert_eq!(frame.timestamp_ns, 42);
        assert_eq!(frame.source, SourceTag::Composite);
    }

    #[test]
    fn toggling_the_camera_arms_a_transition() {
        let scene = Arc::new(LiveScene::new(SceneConfig {
            transition: TransitionSettings {
                kind: TransitionKind::Fade,
                duration_secs: 1.0,
            },
            ..Default::default()
        }));
        let mut composer = composer(&scene);
        let t0 = Instant::now();
        composer.compose(0, t0);
        composer.compose(1, t0);
        assert!(!composer.is_transitioning());

        scene.set_camera_enabled(true).unwrap();
        composer.compose(2, t0 + Duration::from_millis(100));
        assert!(composer.is_transitioning());

        composer.compose(3, t0 + Duration::from_secs(2));
        assert!(!composer.is_transitioning());
    }

    #[test]
    fn cut_never_arms() {
        let scene = Arc::new(LiveScene::new(SceneConfig {
            transition: TransitionSettings {
                kind: TransitionKind::Cut,
                duration_secs: 1.0,
            },
            ..Default::default()
        }));
        let mut composer = composer(&scene);
        let now = Instant::now();
        composer.compose(0, now);
        scene.set_only_overlay(true).unwrap();
        composer.compose(1, now);
        assert!(!composer.is_transitioning());
    }

    #[test]
    fn live_updates_apply_from_the_next_frame() {
        let scene = Arc::new(LiveScene::default());
        let mut composer = composer(&scene);
        let plain = composer.compose(0, Instant::now());

        scene
            .set_effects(EffectParameters {
                grayscale: 1.0,
                ..Default::default()
            })
            .unwrap();
        let gray = composer.compose(1, Instant::now());
        assert_ne!(plain.image, gray.image);
        assert!(gray.image.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));

        let wipe = TransitionSettings {
            kind: TransitionKind::Wipe,
            duration_secs: 0.5,
        };
        scene.set_transition(wipe).unwrap();
        let overlay = OverlayState {
            x: 4,
            y: 2,
            scale: 0.25,
            ..Default::default()
        };
        scene.set_overlay(overlay).unwrap();
        assert!(scene
            .set_overlay(OverlayState {
                scale: -1.0,
                ..overlay
            })
            .is_err());

        let snapshot = scene.snapshot();
        assert_eq!(snapshot.transition, wipe);
        assert_eq!(snapshot.overlay, overlay);
        assert_eq!(snapshot.effects.grayscale, 1.0);
        assert_eq!(scene.revision(), 3);
        assert_eq!(composer.frames_composed(), 2);
    }

    #[test]
    fn hidden_camera_is_not_read() {
        let scene = Arc::new(LiveScene::default());
        let mut composer = composer(&scene);
        composer.compose(0, Instant::now());
        assert!(!composer.lease().hub().camera_open());
    }
}
