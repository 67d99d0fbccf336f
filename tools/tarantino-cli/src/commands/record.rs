//! Record a session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use tarantino_capture_engine::pipeline::GstBackend;
use tarantino_capture_engine::{
    DeviceBackend, HubConfig, LiveScene, PreviewConfig, PreviewScheduler, RecordingSession,
    SceneConfig, SessionConfig, SourceHub, SyntheticBackend, SyntheticOptions,
};
use tarantino_common::config::AppConfig;
use tarantino_frame_model::{AudioSettings, EffectParameters, Resolution, TransitionKind};
use tarantino_render_engine::FfmpegMuxer;

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Recording name, used for every artifact file
    #[arg(short, long, default_value = "recording")]
    pub name: String,

    /// Output resolution as WxH
    #[arg(long)]
    pub resolution: Option<Resolution>,

    /// Target FPS
    #[arg(long)]
    pub fps: Option<u32>,

    /// Video bitrate in kbit/s
    #[arg(long)]
    pub bitrate: Option<u32>,

    /// Final container (mp4, mkv, mov, webm)
    #[arg(long)]
    pub container: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl+C
    #[arg(long)]
    pub duration: Option<f64>,

    /// Show the camera overlay
    #[arg(long)]
    pub camera: bool,

    /// Show only the camera, scaled to the full frame
    #[arg(long)]
    pub only_overlay: bool,

    /// Record video only
    #[arg(long)]
    pub no_audio: bool,

    /// Scene preset (JSON: effects, overlay, transition, audio)
    #[arg(long)]
    pub scene: Option<PathBuf>,

    /// Effect parameters (JSON), overriding the scene preset
    #[arg(long)]
    pub effects: Option<PathBuf>,

    /// Transition on source changes: cut, fade, or wipe
    #[arg(long)]
    pub transition: Option<TransitionKind>,

    /// Use the synthetic test-pattern devices instead of real hardware
    #[arg(long)]
    pub synthetic: bool,

    /// Directory for the intermediate and final artifacts
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Also save the finished recording to this path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the last preview frame to this PNG when the recording ends
    #[arg(long)]
    pub preview_png: Option<PathBuf>,
}

/// On-disk scene preset.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ScenePreset {
    #[serde(flatten)]
    scene: SceneConfig,
    audio: Option<AudioSettings>,
}

impl ScenePreset {
    fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scene preset {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid scene preset {}", path.display()))
    }
}

/// Apply command-line overrides to the configured defaults.
fn build_config(args: &RecordArgs, app: &mut AppConfig) -> anyhow::Result<(SessionConfig, SceneConfig)> {
    if let Some(resolution) = args.resolution {
        app.recording.resolution = resolution.to_string();
    }
    if let Some(fps) = args.fps {
        app.recording.fps = fps;
    }
    if let Some(bitrate) = args.bitrate {
        app.recording.bitrate_kbps = bitrate;
    }
    if let Some(container) = &args.container {
        app.recording.container = container.clone();
    }
    if let Some(dir) = &args.output_dir {
        app.output_dir = dir.clone();
    }
    if args.no_audio {
        app.audio.enabled = false;
    }

    let mut config = SessionConfig::from_app_config(app, args.name.clone())?;

    let preset = match &args.scene {
        Some(path) => ScenePreset::load(path)?,
        None => ScenePreset::default(),
    };
    let mut scene = preset.scene;
    if let Some(audio) = preset.audio {
        config.audio_settings = audio;
    }
    if let Some(path) = &args.effects {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read effects {}", path.display()))?;
        scene.effects = EffectParameters::from_json(&json)?;
    }
    if args.camera {
        scene.overlay.enabled = true;
    }
    if args.only_overlay {
        scene.overlay.fills_frame = true;
    }
    if let Some(kind) = args.transition {
        scene.transition.kind = kind;
    }

    config.validate()?;
    scene.validate()?;
    Ok((config, scene))
}

pub async fn run(args: RecordArgs, mut app: AppConfig) -> anyhow::Result<()> {
    let (config, scene_config) = build_config(&args, &mut app)?;

    let backend: Arc<dyn DeviceBackend> = if args.synthetic {
        Arc::new(SyntheticBackend::new(SyntheticOptions::default()))
    } else {
        Arc::new(GstBackend::new()?)
    };

    println!("Starting recording: {}", config.name);
    println!("  Output: {}", config.output_dir.display());
    println!("  Resolution: {} @ {} fps, {} kbps", config.resolution, config.fps, config.bitrate_kbps);
    println!("  Container: {}", config.container);
    println!("  Camera: {}", scene_config.overlay.shows_camera());
    println!("  Audio: {}", config.audio_enabled);
    println!("  Devices: {}", backend.name());
    println!();

    let hub = SourceHub::new(backend, HubConfig::from_defaults(config.resolution, &app.devices));
    let scene = Arc::new(LiveScene::new(scene_config));

    let mut preview = match &args.preview_png {
        Some(_) => {
            let mut preview = PreviewScheduler::new(
                Arc::clone(&hub),
                Arc::clone(&scene),
                PreviewConfig::from(&app.preview),
            );
            preview.start()?;
            Some(preview)
        }
        None => None,
    };

    let mut session = RecordingSession::new(config, hub, scene, Arc::new(FfmpegMuxer::new()));
    let mut status = session.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            if let Some(message) = current.message {
                tracing::warn!(state = ?current.state, "{message}");
            }
        }
    });

    session.start()?;

    match args.duration {
        Some(secs) => {
            println!("Recording for {secs:.1}s (Ctrl+C stops early)...");
            let limit = Duration::try_from_secs_f64(secs.max(0.0))
                .context("Duration is out of range")?;
            tokio::select! {
                _ = tokio::time::sleep(limit) => {}
                result = tokio::signal::ctrl_c() => result?,
            }
        }
        None => {
            println!("Press Ctrl+C to stop recording...");
            tokio::signal::ctrl_c().await?;
        }
    }
    println!();

    let (session, report) = tokio::task::spawn_blocking(move || {
        let report = session.stop();
        (session, report)
    })
    .await?;

    if let Some(mut preview) = preview.take() {
        preview.stop();
        if let (Some(path), Some(frame)) = (&args.preview_png, preview.latest()) {
            frame
                .image
                .save(path)
                .with_context(|| format!("Failed to write preview {}", path.display()))?;
            println!("Preview frame: {}", path.display());
        }
    }

    let report = report.context("Recording was not running")?;
    println!(
        "Recorded {:.1}s, {} frames ({} write failures, {} substituted)",
        report.duration.as_secs_f64(),
        report.frames_written,
        report.write_failures,
        report.substituted_frames
    );
    match (&report.final_path, &report.mux_error) {
        (Some(path), _) => println!("Recording saved to: {}", path.display()),
        (None, Some(error)) => {
            println!("Final file not produced: {error}");
            println!("Raw video kept at: {}", report.artifact.video.display());
            if let Some(audio) = &report.audio_path {
                println!("Raw audio kept at: {}", audio.display());
            }
        }
        (None, None) => println!("Raw video kept at: {}", report.artifact.video.display()),
    }

    if let Some(output) = &args.output {
        let outcome = tokio::task::spawn_blocking({
            let output = output.clone();
            move || session.save(&output)
        })
        .await?;
        println!("{}", outcome.message);
        if !outcome.success {
            anyhow::bail!("Saving to {} failed", output.display());
        }
    }

    Ok(())
}
