//! Minimum-cost perfect matching between tracks (rows) and blobs (columns).
//!
//! The solver works on integers, so real costs are scaled by `SCALE_FACTOR` and
//! rounded. A rectangular problem is padded to a square one with
//! `UNMATCHED_COST`, which sits above any real combined cost; pairs that land on
//! padding are not reported.

use pathfinding::{matrix::Matrix, prelude::kuhn_munkres_min};
use tracing::trace;

const SCALE_FACTOR: f64 = 1_000_000.0;

/// Cost of pairing a real row or column with padding.
pub const UNMATCHED_COST: f64 = 8.1;

/// Solves the assignment for `costs[row][col]` and returns the `(row, col)`
/// pairs between real rows and real columns. Empty input yields no pairs.
pub fn min_cost_matching(costs: &[Vec<f64>]) -> Vec<(usize, usize)> {
    let rows = costs.len();
    let cols = costs.iter().map(Vec::len).max().unwrap_or(0);
    if rows == 0 || cols == 0 {
        return Vec::new();
    }
    let size = rows.max(cols);

    let data: Vec<i64> = (0..size)
        .flat_map(|r| {
            (0..size).map(move |c| {
                let cost = costs
                    .get(r)
                    .and_then(|row| row.get(c))
                    .copied()
                    .filter(|v| v.is_finite())
                    .unwrap_or(UNMATCHED_COST);
                (cost * SCALE_FACTOR).round() as i64
            })
        })
        .collect();
    let matrix = match Matrix::from_vec(size, size, data) {
        Ok(matrix) => matrix,
        Err(_) => return Vec::new(),
    };

    let (total, assignment) = kuhn_munkres_min(&matrix);
    trace!(size, total, "assignment solved");

    assignment
        .into_iter()
        .enumerate()
        .filter(|&(r, c)| r < rows && costs[r].get(c).is_some())
        .collect()
}
