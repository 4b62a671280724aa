// THEORY:
// The tracker reconciles the live tracks of the previous frame with the blobs of
// the current one. It holds no per-run state: the caller owns the track list and
// threads it from one call to the next. A track is represented by its most
// recent blob, so binding a blob to a track means "the blob inherits the track's
// identity and becomes the track".
//
// Per-frame passes, in order:
// 1.  **High overlap**: cheap geometric shortcut. A track and a blob with nearly
//     equal boxes whose centroids sit in each other's central band are bound
//     immediately at cost 0.
// 2.  **Optimal assignment**: the rest are scored with the weighted cost model
//     and solved as a minimum-cost perfect matching. Pairs under the cost
//     threshold are bound.
// 3.  **Aging**: unmatched tracks coast one more frame, or die once they reach
//     `max_age`.
// 4.  **Spawn**: unmatched blobs start new tracks under their own detection id.
//
// Every pass builds fresh output lists rather than removing from its inputs.

use crate::config::TrackerConfig;
use crate::core_modules::assignment::min_cost_matching;
use crate::core_modules::blob::Blob;
use crate::core_modules::cost_scale::CostModel;
use crate::core_modules::geometry::bearing;
use crate::error::Result;
use tracing::{debug, info, trace};

/// Largest allowed ratio between the two box areas for a high-overlap match.
const OVERLAP_AREA_RATIO: f64 = 1.2;
/// Horizontal band of the other box that a centroid must fall into.
const BAND_X: (f64, f64) = (0.40, 0.60);
/// Vertical band; slightly shorter towards the bottom. Applies in both
/// directions, including a blob's centroid inside a track's box.
const BAND_Y: (f64, f64) = (0.40, 0.56);

pub const HIGH_OVERLAP_LABEL: &str = "HighOverlap";

/// True when the two blobs are almost certainly the same object that barely
/// moved. Symmetric in its arguments: both centroids are checked against the
/// same bands, which deliberately narrows the vertical bound for a blob inside
/// a track's box from 0.60 to 0.56.
pub fn high_overlap(a: &Blob, b: &Blob) -> bool {
    let (area_a, area_b) = (a.box_area() as f64, b.box_area() as f64);
    if area_a > area_b * OVERLAP_AREA_RATIO || area_b > area_a * OVERLAP_AREA_RATIO {
        return false;
    }
    centroid_in_band(a, b) && centroid_in_band(b, a)
}

/// Whether `inner`'s centroid lies within the central band of `outer`'s box.
fn centroid_in_band(inner: &Blob, outer: &Blob) -> bool {
    let r = &outer.rect;
    let (cx, cy) = (inner.center.x as f64, inner.center.y as f64);
    let (x, y, w, h) = (r.x as f64, r.y as f64, r.width as f64, r.height as f64);
    cx >= x + w * BAND_X.0 && cx <= x + w * BAND_X.1 && cy >= y + h * BAND_Y.0 && cy <= y + h * BAND_Y.1
}

pub struct Tracker {
    costs: CostModel,
    max_age: u32,
    cost_threshold: f64,
}

impl Tracker {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            costs: CostModel::from_config(&config.scales)?,
            max_age: config.max_age,
            cost_threshold: config.cost_threshold,
        })
    }

    /// Binds `blobs` to `tracks` and returns `(live_tracks, dead_tracks)`. The live
    /// list is the input for the next frame.
    pub fn manage_tracks(&self, tracks: Vec<Blob>, blobs: Vec<Blob>) -> (Vec<Blob>, Vec<Blob>) {
        let mut live = Vec::with_capacity(tracks.len() + blobs.len());
        let mut dead = Vec::new();

        // --- 1. High overlap ---
        let mut open_blobs: Vec<Option<Blob>> = blobs.into_iter().map(Some).collect();
        let mut open_tracks = Vec::new();
        for track in tracks {
            let hit = open_blobs
                .iter_mut()
                .find(|slot| matches!(slot, Some(b) if high_overlap(&track, b)))
                .and_then(Option::take);
            match hit {
                Some(mut blob) => {
                    blob.track_id = track.track_id;
                    blob.age = 0;
                    blob.delay = track.age;
                    blob.cost = Some(0.0);
                    blob.weights = HIGH_OVERLAP_LABEL.to_string();
                    debug!(track_id = ?blob.track_id, "high-overlap match");
                    live.push(blob);
                }
                None => open_tracks.push(Some(track)),
            }
        }
        let overlap_matches = live.len();
        let mut open_blobs: Vec<Option<Blob>> = open_blobs.into_iter().filter(Option::is_some).collect();

        // --- 2. Optimal assignment ---
        if !open_tracks.is_empty() && !open_blobs.is_empty() {
            let mut costs = Vec::with_capacity(open_tracks.len());
            let mut breakdowns = Vec::with_capacity(open_tracks.len());
            for track in open_tracks.iter().flatten() {
                let (row, labels): (Vec<f64>, Vec<String>) = open_blobs
                    .iter()
                    .flatten()
                    .map(|blob| self.costs.compare(track, blob))
                    .unzip();
                trace!(track_id = ?track.track_id, costs = ?row, "cost row");
                costs.push(row);
                breakdowns.push(labels);
            }

            for (t, b) in min_cost_matching(&costs) {
                let cost = costs[t][b];
                if cost >= self.cost_threshold {
                    continue;
                }
                let (Some(track), Some(mut blob)) = (open_tracks[t].take(), open_blobs[b].take()) else {
                    continue;
                };
                blob.track_id = track.track_id;
                blob.direction = bearing(&track.center, &blob.center);
                blob.age = 0;
                blob.delay = track.age;
                blob.cost = Some(cost);
                blob.weights = std::mem::take(&mut breakdowns[t][b]);
                debug!(track_id = ?blob.track_id, cost, weights = %blob.weights, "assigned");
                live.push(blob);
            }
        }
        let assigned = live.len() - overlap_matches;

        // --- 3. Aging ---
        let mut coasting = 0;
        for mut track in open_tracks.into_iter().flatten() {
            if track.age < self.max_age {
                track.age += 1;
                track.cost = None;
                track.weights.clear();
                coasting += 1;
                live.push(track);
            } else {
                info!(track_id = ?track.track_id, age = track.age, "track lost");
                dead.push(track);
            }
        }

        // --- 4. Spawn ---
        let mut spawned = 0;
        for mut blob in open_blobs.into_iter().flatten() {
            blob.track_id = Some(blob.id);
            blob.changed = true;
            blob.age = 0;
            blob.delay = 0;
            blob.cost = None;
            blob.weights.clear();
            info!(track_id = blob.id, x = blob.center.x, y = blob.center.y, "track spawned");
            spawned += 1;
            live.push(blob);
        }

        debug!(
            overlap_matches,
            assigned,
            coasting,
            spawned,
            dead = dead.len(),
            "tracks managed"
        );
        (live, dead)
    }
}
