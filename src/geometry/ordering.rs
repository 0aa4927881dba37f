//! Alternate ordering for point sets that arrive without panel
//! correspondence: an approximate open-path travelling salesman tour.
//!
//! The assignment-based assembly in [`super::ribbons`] is the default; this
//! path is only for callers that cannot assume any correspondence.

use super::{VoxelPoint, VoxelSpacing};
use nalgebra::DMatrix;
use tracing::debug;

const MAX_PASSES: usize = 50;

/// Orders `points` into a short open path.
///
/// The path starts at one end of the furthest pair, is grown by nearest
/// neighbour over the complete distance graph and then improved by 2-opt
/// moves until none shortens it.
pub fn sort_points(points: &[VoxelPoint], spacing: &VoxelSpacing) -> Vec<VoxelPoint> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let dist = DMatrix::from_fn(n, n, |i, j| spacing.distance(&points[i], &points[j]));

    let mut path = nearest_neighbour_path(&dist, furthest_index(&dist));
    let passes = two_opt(&mut path, &dist);
    debug!(points = n, passes, length = path_length(&path, &dist), "ordered point set");

    path.into_iter().map(|i| points[i]).collect()
}

fn furthest_index(dist: &DMatrix<f64>) -> usize {
    let mut best = (0, 0.0);
    for i in 0..dist.nrows() {
        for j in i + 1..dist.ncols() {
            if dist[(i, j)] > best.1 {
                best = (i, dist[(i, j)]);
            }
        }
    }
    best.0
}

fn nearest_neighbour_path(dist: &DMatrix<f64>, start: usize) -> Vec<usize> {
    let n = dist.nrows();
    let mut visited = vec![false; n];
    let mut path = Vec::with_capacity(n);
    let mut current = start;
    visited[current] = true;
    path.push(current);

    while path.len() < n {
        let next = (0..n)
            .filter(|&j| !visited[j])
            .min_by(|&a, &b| dist[(current, a)].total_cmp(&dist[(current, b)]));
        match next {
            Some(j) => {
                visited[j] = true;
                path.push(j);
                current = j;
            }
            None => break,
        }
    }
    path
}

/// Open-path 2-opt: reversing `path[i..=k]` swaps edges (i-1, i) and
/// (k, k+1) for (i-1, k) and (i, k+1); missing edges at the ends count 0.
fn two_opt(path: &mut [usize], dist: &DMatrix<f64>) -> usize {
    let n = path.len();
    let d = |a: usize, b: usize| dist[(a, b)];

    for pass in 0..MAX_PASSES {
        let mut improved = false;
        for i in 0..n - 1 {
            for k in i + 1..n {
                let mut before = 0.0;
                let mut after = 0.0;
                if i > 0 {
                    before += d(path[i - 1], path[i]);
                    after += d(path[i - 1], path[k]);
                }
                if k + 1 < n {
                    before += d(path[k], path[k + 1]);
                    after += d(path[i], path[k + 1]);
                }
                if after < before - 1e-12 {
                    path[i..=k].reverse();
                    improved = true;
                }
            }
        }
        if !improved {
            return pass + 1;
        }
    }
    MAX_PASSES
}

fn path_length(path: &[usize], dist: &DMatrix<f64>) -> f64 {
    path.windows(2).map(|w| dist[(w[0], w[1])]).sum()
}
