use super::matching::max_weight_assignment;
use super::tetragon::intersect_tetragons;
use super::{Ribbon, Segment, VoxelPoint, VoxelSpacing};
use crate::error::{FilamentError, FilamentResult};

use nalgebra::DMatrix;
use rayon::prelude::*;
use tracing::debug;

/// Assignment score of a panel pair that does not cross.
const NO_CROSSING_SCORE: f64 = -1.0;
/// Added to every chord length so that touching panels beat non-crossing ones.
const MIN_CROSSING_SCORE: f64 = 1e-9;
/// Relative distance difference below which both ends count as equally close.
const ORIENTATION_TOL: f64 = 1e-6;

/// Reconstructs the filament seen by two ribbons drawn from different views.
///
/// Every panel of `ribbon1` is intersected with every panel of `ribbon2`.
/// Panels are then paired one-to-one so that the summed physical chord
/// length is maximal. Interior chords collapse to their midpoints, and the
/// curve is anchored on the two chord ends that lie furthest apart.
///
/// Returns `FilamentError::EmptyIntersection` if no matched pair crosses.
pub fn intersect_ribbons(
    ribbon1: &Ribbon,
    ribbon2: &Ribbon,
    spacing: &VoxelSpacing,
) -> FilamentResult<Vec<VoxelPoint>> {
    let grid = panel_grid(ribbon1, ribbon2);
    let (n1, n2) = (ribbon1.n_panels(), ribbon2.n_panels());

    // touching panels (zero-length chords) still outrank non-crossing cells
    let scores = DMatrix::from_fn(n1, n2, |i, j| {
        grid[i][j].map_or(NO_CROSSING_SCORE, |segment| {
            segment.length(spacing) + MIN_CROSSING_SCORE
        })
    });
    let assignment = max_weight_assignment(&scores);

    // rows come out in ribbon1 panel order
    let matched: Vec<(usize, Segment)> = assignment
        .iter()
        .enumerate()
        .filter_map(|(i, &j)| j.and_then(|j| grid[i][j]).map(|s| (i, s)))
        .collect();

    debug!(
        panels_a = n1,
        panels_b = n2,
        crossing = grid.iter().flatten().filter(|s| s.is_some()).count(),
        matched = matched.len(),
        "panel assignment solved"
    );

    if matched.is_empty() {
        return Err(FilamentError::EmptyIntersection);
    }
    Ok(assemble_curve(&matched, ribbon1, spacing))
}

/// Dense (panel of ribbon1) x (panel of ribbon2) table of chords.
/// Non-crossing cells stay in place as `None`.
pub fn panel_grid(ribbon1: &Ribbon, ribbon2: &Ribbon) -> Vec<Vec<Option<Segment>>> {
    (0..ribbon1.n_panels())
        .into_par_iter()
        .map(|i| {
            let p1 = ribbon1.tetragon(i);
            (0..ribbon2.n_panels())
                .map(|j| intersect_tetragons(&p1, &ribbon2.tetragon(j)))
                .collect()
        })
        .collect()
}

/// Builds `[head, interior midpoints..., tail]` from chords ordered along
/// the first ribbon, where head and tail are the furthest pair of chord
/// ends. The head is the end closer to the first chord; when both are
/// equally close (always the case for a single chord) it is the end that
/// comes first along the stroke direction of the first matched panel.
fn assemble_curve(
    matched: &[(usize, Segment)],
    ribbon1: &Ribbon,
    spacing: &VoxelSpacing,
) -> Vec<VoxelPoint> {
    let ends: Vec<VoxelPoint> = matched
        .iter()
        .flat_map(|(_, s)| [s.start, s.end])
        .collect();
    let ((a, b), _) = find_furthest_points(&ends, spacing);

    let (first_panel, first_chord) = matched[0];
    let first = first_chord.midpoint();
    let (da, db) = (spacing.distance(&a, &first), spacing.distance(&b, &first));
    let a_leads = if (da - db).abs() > ORIENTATION_TOL * (da + db).max(1.0) {
        da < db
    } else {
        let stroke = spacing.physical(&ribbon1.near()[first_panel + 1])
            - spacing.physical(&ribbon1.near()[first_panel]);
        spacing.physical(&a).dot(&stroke) <= spacing.physical(&b).dot(&stroke)
    };
    let (head, tail) = if a_leads { (a, b) } else { (b, a) };

    let mut curve = Vec::with_capacity(matched.len().max(2));
    curve.push(head);
    if matched.len() > 2 {
        curve.extend(matched[1..matched.len() - 1].iter().map(|(_, s)| s.midpoint()));
    }
    curve.push(tail);
    curve
}

/// Pair of points with the largest physical distance, and that distance.
/// A single point is paired with itself; `points` must not be empty.
pub fn find_furthest_points(
    points: &[VoxelPoint],
    spacing: &VoxelSpacing,
) -> ((VoxelPoint, VoxelPoint), f64) {
    let mut max_dist = 0.0;
    let mut furthest = (points[0], points[0]);

    for i in 0..points.len() {
        for j in i + 1..points.len() {
            let dist = spacing.distance(&points[i], &points[j]);
            if dist > max_dist {
                max_dist = dist;
                furthest = (points[i], points[j]);
            }
        }
    }

    (furthest, max_dist)
}
