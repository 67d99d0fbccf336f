//! Tarantino Render Engine
//!
//! Per-frame compositing and transition blending, plus the final mux of the
//! intermediate artifacts into the delivered container.
//!
//! # Pipeline Architecture
//!
//! ```text
//! screen frame ──┐
//!                ├── Compositor (overlay paste / overlay-only)
//! camera frame ──┘         │
//!                          ├── TransitionEngine (cut / fade / wipe)
//!                          ▼
//!                    composite frame ──► VideoSink ──► <name>.video.mkv ──┐
//!                                                                         ├── Muxer ──► <name>.<container>
//!                                        AudioCaptureEngine ──► <name>.audio.wav ──┘
//! ```

pub mod compositor;
pub mod mux;
pub mod transition;

pub use compositor::{compose, plan_composition, CompositionPlan};
pub use mux::{FfmpegMuxer, Muxer};
pub use transition::TransitionEngine;
