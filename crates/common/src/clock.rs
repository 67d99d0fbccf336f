//! Clock and timing utilities for the recording loops.
//!
//! Every Tarantino stream is anchored to a monotonic epoch recorded when a
//! session starts. This module provides:
//! - The recording clock with pause accounting
//! - Frame pacing for fixed-cadence loops
//! - Drift measurement between the video and audio artifacts

use std::time::{Duration, Instant};

/// A recording clock that reports active (non-paused) time relative to the
/// moment recording started.
#[derive(Debug, Clone)]
pub struct RecordingClock {
    /// The instant recording started.
    epoch: Instant,

    /// Wall-clock time at epoch (RFC 3339 string).
    epoch_wall: String,

    /// Sum of all completed pauses.
    paused_total: Duration,

    /// Start of the pause in progress, if any.
    paused_at: Option<Instant>,
}

impl RecordingClock {
    /// Create a new recording clock anchored to now.
    pub fn start() -> Self {
        Self::from_epoch(Instant::now(), chrono::Utc::now().to_rfc3339())
    }

    /// Create a clock from a known epoch.
    pub fn from_epoch(epoch: Instant, wall: String) -> Self {
        Self {
            epoch,
            epoch_wall: wall,
            paused_total: Duration::ZERO,
            paused_at: None,
        }
    }

    /// Mark the beginning of a pause. Returns false if already paused.
    pub fn pause_at(&mut self, now: Instant) -> bool {
        if self.paused_at.is_some() {
            return false;
        }
        self.paused_at = Some(now);
        true
    }

    /// End the current pause, adding its length to the paused total.
    ///
    /// Returns the length of the pause that just ended.
    pub fn resume_at(&mut self, now: Instant) -> Option<Duration> {
        let started = self.paused_at.take()?;
        let paused = now.saturating_duration_since(started);
        self.paused_total += paused;
        Some(paused)
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Accumulated duration of completed pauses.
    pub fn paused_total(&self) -> Duration {
        self.paused_total
    }

    /// Active recording time at `now`: wall time since the epoch minus every
    /// pause. Frozen while a pause is in progress.
    pub fn elapsed_at(&self, now: Instant) -> Duration {
        let reference = match self.paused_at {
            Some(paused_at) => paused_at.min(now),
            None => now,
        };
        reference
            .saturating_duration_since(self.epoch)
            .saturating_sub(self.paused_total)
    }

    /// Active recording time so far.
    pub fn elapsed(&self) -> Duration {
        self.elapsed_at(Instant::now())
    }

    /// Active nanoseconds since recording start.
    pub fn elapsed_ns(&self) -> u64 {
        self.elapsed().as_nanos() as u64
    }

    /// Wall-clock time at recording start.
    pub fn epoch_wall(&self) -> &str {
        &self.epoch_wall
    }
}

/// Fixed-cadence pacing: each cycle sleeps `max(0, period - work)`.
#[derive(Debug, Clone, Copy)]
pub struct FramePacer {
    period: Duration,
}

impl FramePacer {
    /// Create a pacer for the given rate in Hz. A rate of zero is treated as 1.
    pub fn new(rate_hz: u32) -> Self {
        Self {
            period: Duration::from_nanos(1_000_000_000 / rate_hz.max(1) as u64),
        }
    }

    /// Target period between cycles.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Time left in the current cycle after `work` has been spent.
    pub fn remaining(&self, work: Duration) -> Duration {
        self.period.saturating_sub(work)
    }

    /// Sleep out the rest of the cycle that began at `cycle_started`.
    pub fn pace(&self, cycle_started: Instant) {
        let remaining = self.remaining(cycle_started.elapsed());
        if !remaining.is_zero() {
            std::thread::sleep(remaining);
        }
    }
}

/// Drift measurement between two streams.
#[derive(Debug, Clone, Copy)]
pub struct DriftMeasurement {
    /// Timestamp in the reference stream (ns).
    pub reference_ns: u64,
    /// Timestamp in the measured stream (ns).
    pub measured_ns: u64,
}

impl DriftMeasurement {
    /// Drift in nanoseconds (positive = measured is ahead).
    pub fn drift_ns(&self) -> i64 {
        self.measured_ns as i64 - self.reference_ns as i64
    }

    /// Drift in milliseconds.
    pub fn drift_ms(&self) -> f64 {
        self.drift_ns() as f64 / 1_000_000.0
    }

    /// Whether drift exceeds an acceptable threshold.
    pub fn exceeds_threshold_ms(&self, threshold_ms: f64) -> bool {
        self.drift_ms().abs() > threshold_ms
    }
}
