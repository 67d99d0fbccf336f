//! Tarantino Frame Model
//!
//! Defines the values that flow between the recorder stages:
//!
//! - `FrameBuffer`: one captured or composited RGB frame
//! - `Resolution`: "WxH" output geometry
//! - `EffectParameters`: per-frame effect controls
//! - `OverlayState`: camera overlay layout
//! - `TransitionSettings`: blend kind and duration for source switches
//! - `AudioSettings` / `AudioFormat`: audio conditioning and PCM layout
//! - `OutputArtifact`: intermediate and final file paths

pub mod artifact;
pub mod audio;
pub mod effects;
pub mod frame;
pub mod overlay;
pub mod transition;

pub use artifact::*;
pub use audio::*;
pub use effects::*;
pub use frame::*;
pub use overlay::*;
pub use transition::*;
