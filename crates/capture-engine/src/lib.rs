//! Tarantino Capture Engine
//!
//! Opens the capture devices, composes the live scene at a fixed cadence and
//! turns it into a recording, with an independent preview loop alongside.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      SourceHub (leases)                   │
//! │        ScreenSource (shared cache)     CameraSource       │
//! └──────────────┬───────────────────────────────┬────────────┘
//!                │                               │
//!     ┌──────────▼──────────┐         ┌──────────▼──────────┐
//!     │ RecordingSession    │         │ PreviewScheduler    │
//!     │  SceneComposer      │         │  SceneComposer      │
//!     │  effects → compose  │         │  effects → compose  │
//!     │  → transition       │         │  → transition       │
//!     │  → VideoSink        │         │  → watch cell       │
//!     │ AudioCaptureEngine  │         └─────────────────────┘
//!     │  → Muxer            │
//!     └─────────────────────┘
//! ```
//!
//! Devices come from a [`DeviceBackend`]: [`pipeline::GstBackend`] for real
//! hardware, [`synthetic::SyntheticBackend`] for dry runs.

pub mod devices;
pub mod hub;
pub mod pipeline;
pub mod preview;
pub mod scene;
pub mod session;
pub mod source;
pub mod synthetic;

pub use devices::{CameraDevice, DeviceBackend, ScreenGrabber, VideoSink, VideoSinkConfig};
pub use hub::{HubConfig, SourceHub, SourceLease};
pub use preview::{PreviewConfig, PreviewScheduler};
pub use scene::{LiveScene, SceneComposer, SceneConfig};
pub use session::*;
pub use source::{CameraSource, CaptureSource, ScreenSource};
pub use synthetic::{SyntheticBackend, SyntheticOptions};
