// Example runner: feeds a folder of still images from one trap camera through
// the detection-and-tracking pipeline and logs the tracks it finds.
//
// Usage: moth_vision <config.json> <image_dir>

use anyhow::{Context, bail};
use moth_vision::{Config, VisionPipeline};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        bail!("usage: {} <config.json> <image_dir>", args[0]);
    }

    let config = Config::from_json_file(&args[1])
        .with_context(|| format!("loading configuration from {}", args[1]))?;
    let frames = list_images(Path::new(&args[2]))?;
    info!(frames = frames.len(), dir = %args[2], "starting run");

    let mut pipeline = VisionPipeline::new(&config)?;
    let mut track_ids = BTreeSet::new();
    let mut finished = 0usize;

    for path in &frames {
        let frame = match image::open(path) {
            Ok(image) => image.to_rgb8(),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable frame");
                continue;
            }
        };

        let report = match pipeline.process_frame(&frame) {
            Ok(report) => report,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping frame");
                continue;
            }
        };

        for track in &report.tracks {
            if let Some(id) = track.track_id {
                track_ids.insert(id);
            }
        }
        finished += report.dead_tracks.len();

        let summary: Vec<String> = report
            .tracks
            .iter()
            .filter(|t| t.age == 0)
            .map(|t| {
                format!(
                    "{}@({},{}) {} {}",
                    t.track_id.unwrap_or_default(),
                    t.center.x,
                    t.center.y,
                    t.colors,
                    t.weights
                )
            })
            .collect();
        info!(
            frame_id = report.frame_id,
            file = %path.display(),
            detected = report.detected,
            live = report.tracks.len(),
            dead = report.dead_tracks.len(),
            "{}",
            summary.join(" | ")
        );
    }

    info!(
        tracks = track_ids.len(),
        finished,
        still_live = pipeline.tracks().len(),
        "run complete"
    );
    Ok(())
}

/// Image files directly inside `dir`, in filename order.
fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if path.is_file() && is_image {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
