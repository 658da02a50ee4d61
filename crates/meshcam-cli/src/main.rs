use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use meshcam_core::{Canvas, DetectionResult, LandmarkGroup, OverlayRenderer};
use meshcam_tracker::config::{self, Config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod track;

#[derive(Parser)]
#[command(name = "meshcam", about = "Live face landmark tracking with overlay and blink detection")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track a face from the camera (or a still image) until Ctrl-C
    Track(track::TrackArgs),
    /// List V4L2 capture devices
    Devices,
    /// Show the overlay groups and their styles as JSON
    Groups,
    /// Draw a saved detection result to a PNG overlay
    Render {
        /// DetectionResult JSON file
        result: PathBuf,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        /// Output PNG path
        #[arg(long)]
        out: PathBuf,
        /// Comma-separated groups to draw (default: all configured)
        #[arg(long, value_delimiter = ',')]
        groups: Vec<LandmarkGroup>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Commands::Track(args) => track::run(config, args).await?,
        Commands::Devices => {
            let devices = meshcam_hw::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} (driver: {}, bus: {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Groups => {
            let groups = config.load_groups()?;
            let listing: Vec<_> = groups
                .iter()
                .map(|g| {
                    serde_json::json!({
                        "name": g.group,
                        "connections": g.connections.len(),
                        "max_index": g.max_index(),
                        "style": g.style,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&listing)?);
        }
        Commands::Render {
            result,
            width,
            height,
            out,
            groups,
        } => {
            let source = std::fs::read_to_string(&result)
                .with_context(|| format!("failed to read {}", result.display()))?;
            let detection: DetectionResult = serde_json::from_str(&source)
                .with_context(|| format!("invalid detection result in {}", result.display()))?;

            let mut all = config.load_groups()?;
            if !groups.is_empty() {
                all = config::select_groups(all, &groups);
            }

            let mut canvas = Canvas::new(width, height);
            OverlayRenderer::new(all).render(&mut canvas, &detection);
            canvas
                .save_png(&out)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Rendered {} face(s) to {}", detection.faces.len(), out.display());
        }
    }

    Ok(())
}
