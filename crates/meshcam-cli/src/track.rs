//! `meshcam track`: a live session driven by the refresh loop.

use anyhow::{Context, Result};
use clap::Args;
use meshcam_core::render::overlay_dimensions;
use meshcam_core::{
    Canvas, ConnectionGroup, Delegate, FaceLandmarker, LandmarkGroup, OnnxFaceMesh, OnnxFaceMeshLoader,
    OverlayRenderer, Surface,
};
use meshcam_hw::{StillImageProvider, StreamProvider, V4l2Provider};
use meshcam_tracker::config::{self, Config};
use meshcam_tracker::{run_refresh_loop, FrameLoop, TrackerError, TrackerEvent, TrackingController};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Args)]
pub struct TrackArgs {
    /// V4L2 device (overrides MESHCAM_CAMERA_DEVICE)
    #[arg(long)]
    device: Option<String>,
    /// Use a still image instead of the camera
    #[arg(long, conflicts_with = "device")]
    image: Option<PathBuf>,
    /// Face mesh ONNX model (overrides MESHCAM_MODEL_PATH)
    #[arg(long)]
    model: Option<PathBuf>,
    /// Compute backend: gpu or cpu
    #[arg(long)]
    delegate: Option<Delegate>,
    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long)]
    duration_secs: Option<u64>,
    /// Save the last frame with its overlay to this PNG
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Comma-separated groups to draw (default: all configured)
    #[arg(long, value_delimiter = ',')]
    groups: Vec<LandmarkGroup>,
}

pub async fn run(mut config: Config, args: TrackArgs) -> Result<()> {
    if let Some(device) = args.device.clone() {
        config.camera_device = device;
    }
    if let Some(model) = args.model.clone() {
        config.model_path = Some(model);
    }
    if let Some(delegate) = args.delegate {
        config.delegate = delegate;
    }

    let mut groups = config.load_groups()?;
    if !args.groups.is_empty() {
        groups = config::select_groups(groups, &args.groups);
    }

    let landmarker = load_landmarker(&config).await?;

    match &args.image {
        Some(path) => session(StillImageProvider::new(path), landmarker, groups, &config, &args).await,
        None => {
            let provider = V4l2Provider::new(&config.camera_device);
            session(provider, landmarker, groups, &config, &args).await
        }
    }
}

/// Model loading blocks on file IO and session setup, so it runs off the runtime thread.
async fn load_landmarker(config: &Config) -> Result<FaceLandmarker<OnnxFaceMesh>> {
    let options = config.landmarker_options();
    let landmarker = tokio::task::spawn_blocking(move || {
        let mut landmarker = FaceLandmarker::new();
        landmarker.initialize(&OnnxFaceMeshLoader, &options)?;
        Ok::<_, TrackerError>(landmarker)
    })
    .await
    .context("model loading task failed")??;
    Ok(landmarker)
}

async fn session<P: StreamProvider>(
    provider: P,
    landmarker: FaceLandmarker<OnnxFaceMesh>,
    groups: Vec<ConnectionGroup>,
    config: &Config,
    args: &TrackArgs,
) -> Result<()> {
    let mut controller = TrackingController::new(
        landmarker,
        provider,
        Canvas::new(0, 0),
        OverlayRenderer::new(groups),
        config.tracker_options(),
    );

    let mut events = controller.subscribe();
    let reporter = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                TrackerEvent::Started { session } => println!("Tracking started (session {session})"),
                TrackerEvent::Blink { score, timestamp_ms } => {
                    println!("Blink detected: score={score:.2} at {timestamp_ms} ms")
                }
                TrackerEvent::Stopped { session, ticks } => {
                    println!("Tracking stopped (session {session}, {ticks} ticks)")
                }
            }
        }
    });

    controller.start().await?;

    let mut frame_loop = FrameLoop::new();
    frame_loop.request();
    let duration = args.duration_secs.map(Duration::from_secs);
    let shutdown = async move {
        match duration {
            Some(d) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = tokio::time::sleep(d) => {}
                }
            }
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            }
        }
    };
    run_refresh_loop(&mut controller, &mut frame_loop, config.refresh_hz, shutdown).await;

    if let Some(path) = &args.snapshot {
        save_snapshot(&controller, path)?;
    }

    let stats = controller.stats();
    let blinked = controller.user_did_blink();
    controller.shutdown();
    drop(controller);
    reporter.await.ok();

    println!(
        "{} ticks, {} inferences, {} duplicate frames, {} errors; blink seen: {}",
        stats.ticks,
        stats.inferences,
        stats.skipped,
        stats.inference_errors,
        if blinked { "yes" } else { "no" }
    );
    Ok(())
}

fn save_snapshot<E, P, C>(controller: &TrackingController<E, P, Canvas, C>, path: &Path) -> Result<()>
where
    E: meshcam_core::LandmarkEngine,
    P: StreamProvider,
    C: meshcam_tracker::Clock,
{
    let frame = controller
        .current_frame()
        .context("no frame available for snapshot")?;
    let canvas = controller.surface();
    if (canvas.width(), canvas.height()) != overlay_dimensions(frame.width, frame.height) {
        anyhow::bail!("overlay size does not match the current frame");
    }
    let composite = canvas
        .composite_over(&frame.data, frame.width, frame.height)
        .context("frame buffer does not match its dimensions")?;
    composite
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Saved snapshot to {}", path.display());
    Ok(())
}
