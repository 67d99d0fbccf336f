//! Transition blending between consecutive composites.
//!
//! The engine remembers the last composite it produced. Arming it snapshots
//! that composite; every following frame is blended from the snapshot toward
//! the new composite until the configured duration has elapsed.

use std::time::{Duration, Instant};

use image::RgbImage;
use tarantino_frame_model::{FrameBuffer, TransitionKind, TransitionSettings};
use tarantino_processing_core::color::mix_channel;

#[derive(Debug, Clone)]
struct ArmedTransition {
    snapshot: FrameBuffer,
    started_at: Instant,
}

/// Blends the previous composite into new ones after a source change.
#[derive(Debug, Clone, Default)]
pub struct TransitionEngine {
    settings: TransitionSettings,
    last_output: Option<FrameBuffer>,
    armed: Option<ArmedTransition>,
}

impl TransitionEngine {
    pub fn new(settings: TransitionSettings) -> Self {
        Self {
            settings,
            last_output: None,
            armed: None,
        }
    }

    pub fn settings(&self) -> TransitionSettings {
        self.settings
    }

    /// Replace the settings; an armed transition keeps running with them.
    pub fn set_settings(&mut self, settings: TransitionSettings) {
        self.settings = settings;
    }

    /// Whether a transition is currently blending.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Start a transition from the last produced composite.
    ///
    /// Returns `false` (nothing armed) for cuts, zero durations, or before any
    /// composite has been produced.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.settings.kind == TransitionKind::Cut || self.settings.duration().is_zero() {
            self.armed = None;
            return false;
        }
        match &self.last_output {
            Some(previous) => {
                tracing::debug!(kind = %self.settings.kind, "Transition armed");
                self.armed = Some(ArmedTransition {
                    snapshot: previous.clone(),
                    started_at: now,
                });
                true
            }
            None => false,
        }
    }

    /// Blend `composite` with the armed snapshot (if any) and remember the
    /// result as the latest composite.
    pub fn process(&mut self, composite: FrameBuffer, now: Instant) -> FrameBuffer {
        let output = match self.armed.take() {
            Some(armed) => {
                let elapsed = now.saturating_duration_since(armed.started_at);
                let duration = self.settings.duration();
                if elapsed >= duration
                    || duration.is_zero()
                    || armed.snapshot.resolution() != composite.resolution()
                {
                    composite
                } else {
                    let progress = progress(elapsed, duration);
                    let blended = match self.settings.kind {
                        TransitionKind::Cut => composite,
                        TransitionKind::Fade => fade(&armed.snapshot, composite, progress),
                        TransitionKind::Wipe => wipe(&armed.snapshot, composite, progress),
                    };
                    self.armed = Some(armed);
                    blended
                }
            }
            None => composite,
        };
        self.last_output = Some(output.clone());
        output
    }

    /// Forget the last composite and any armed transition.
    pub fn reset(&mut self) {
        self.last_output = None;
        self.armed = None;
    }
}

/// `min(elapsed / duration, 1)`.
fn progress(elapsed: Duration, duration: Duration) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    (elapsed.as_secs_f64() / duration.as_secs_f64()).min(1.0) as f32
}

/// `previous * (1 - alpha) + next * alpha`. Sizes must match.
pub fn fade(previous: &FrameBuffer, mut next: FrameBuffer, alpha: f32) -> FrameBuffer {
    for (dst, prev) in next.image.iter_mut().zip(previous.image.iter()) {
        *dst = mix_channel(*prev, *dst, alpha);
    }
    next
}

/// Columns left of `floor(progress * width)` come from `previous`, the rest
/// from `next`. Sizes must match.
pub fn wipe(previous: &FrameBuffer, mut next: FrameBuffer, progress: f32) -> FrameBuffer {
    let width = next.width();
    let boundary = ((progress.clamp(0.0, 1.0) * width as f32).floor() as u32).min(width);
    if boundary > 0 {
        copy_columns(&previous.image, &mut next.image, boundary);
    }
    next
}

fn copy_columns(src: &RgbImage, dst: &mut RgbImage, columns: u32) {
    let row_bytes = dst.width() as usize * FrameBuffer::CHANNELS;
    let span = columns as usize * FrameBuffer::CHANNELS;
    for (dst_row, src_row) in dst
        .chunks_exact_mut(row_bytes)
        .zip(src.chunks_exact(row_bytes))
    {
        dst_row[..span].copy_from_slice(&src_row[..span]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarantino_frame_model::{Resolution, SourceTag};

    const RES: Resolution = Resolution::new(10, 4);

    fn frame(rgb: [u8; 3]) -> FrameBuffer {
        FrameBuffer::filled(RES, rgb, 0, SourceTag::Composite)
    }

    fn engine(kind: TransitionKind, secs: f64) -> TransitionEngine {
        TransitionEngine::new(TransitionSettings {
            kind,
            duration_secs: secs,
        })
    }

    #[test]
    fn fade_runs_from_previous_to_new() {
        let t0 = Instant::now();
        let mut engine = engine(TransitionKind::Fade, 1.0);
        engine.process(frame([0, 0, 0]), t0);
        assert!(engine.arm(t0));

        let start = engine.process(frame([200, 200, 200]), t0);
        assert_eq!(start.image, frame([0, 0, 0]).image);

        let half = engine.process(frame([200, 200, 200]), t0 + Duration::from_millis(500));
        assert_eq!(half.image.get_pixel(0, 0).0, [100, 100, 100]);

        let done = engine.process(frame([200, 200, 200]), t0 + Duration::from_secs(1));
        assert_eq!(done.image, frame([200, 200, 200]).image);
        assert!(!engine.is_armed());
    }

    #[test]
    fn wipe_half_way_splits_the_frame() {
        let t0 = Instant::now();
        let mut engine = engine(TransitionKind::Wipe, 2.0);
        engine.process(frame([255, 0, 0]), t0);
        engine.arm(t0);
        let out = engine.process(frame([0, 0, 255]), t0 + Duration::from_secs(1));
        for x in 0..5 {
            assert_eq!(out.image.get_pixel(x, 2).0, [255, 0, 0], "column {x}");
        }
        for x in 5..10 {
            assert_eq!(out.image.get_pixel(x, 2).0, [0, 0, 255], "column {x}");
        }
    }

    #[test]
    fn cut_and_zero_duration_never_arm() {
        let t0 = Instant::now();
        for mut engine in [engine(TransitionKind::Cut, 1.0), engine(TransitionKind::Fade, 0.0)] {
            engine.process(frame([1, 1, 1]), t0);
            assert!(!engine.arm(t0));
            let out = engine.process(frame([9, 9, 9]), t0);
            assert_eq!(out.image, frame([9, 9, 9]).image);
        }
    }

    #[test]
    fn arming_before_any_composite_is_a_no_op() {
        let mut engine = engine(TransitionKind::Fade, 1.0);
        assert!(!engine.arm(Instant::now()));
    }

    #[test]
    fn mismatched_sizes_behave_as_cut() {
        let t0 = Instant::now();
        let mut engine = engine(TransitionKind::Fade, 1.0);
        engine.process(frame([0, 0, 0]), t0);
        engine.arm(t0);
        let bigger = FrameBuffer::filled(Resolution::new(20, 8), [50, 50, 50], 0, SourceTag::Composite);
        let out = engine.process(bigger.clone(), t0 + Duration::from_millis(100));
        assert_eq!(out, bigger);
        assert!(!engine.is_armed());
    }
}
