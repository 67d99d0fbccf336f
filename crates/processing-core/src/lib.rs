//! Tarantino Processing Core
//!
//! The effect pipeline: a fixed, deterministic chain of pixel transforms
//! (color grading, convolution filters, blends, quantization) applied to
//! each captured frame before compositing.
//!
//! This crate is pure computation with no I/O and no platform dependencies.
//! Frames go in by value and come out by value.

pub mod color;
pub mod effects;

pub use effects::{EffectPipeline, EffectStage};
