use crate::geometry::{VoxelPoint, VoxelSpacing};
use nalgebra::Vector3;

/// Linearly resamples every segment into `n` steps.
///
/// A curve of `K` points becomes `(K - 1) * n + 1` points; the original
/// points are kept exactly. `n <= 1` returns the curve unchanged.
pub fn interpolate_curve(points: &[VoxelPoint], n: usize) -> Vec<VoxelPoint> {
    if n <= 1 || points.len() < 2 {
        return points.to_vec();
    }

    let mut out = Vec::with_capacity((points.len() - 1) * n + 1);
    for pair in points.windows(2) {
        let (a, b) = (pair[0].coords(), pair[1].coords());
        out.push(pair[0]);
        for k in 1..n {
            let t = k as f64 / n as f64;
            out.push(pair[0].moved_to(&a.lerp(&b, t)));
        }
    }
    if let Some(last) = points.last() {
        out.push(*last);
    }
    out
}

/// Drops hook artifacts at free ends of a relaxed snake.
///
/// Within `window` points of each end, a point whose second difference
/// exceeds `threshold` times its incoming step (physical units) marks a
/// hook; everything between that point and the end is removed. The result
/// keeps at least 2 points.
pub fn remove_corners(
    points: &[VoxelPoint],
    spacing: &VoxelSpacing,
    window: usize,
    threshold: f64,
) -> Vec<VoxelPoint> {
    let n = points.len();
    if n < 4 {
        return points.to_vec();
    }
    let phys: Vec<Vector3<f64>> = points.iter().map(|p| spacing.physical(p)).collect();
    let is_hook = |i: usize, prev: usize, next: usize| -> bool {
        let step = (phys[i] - phys[prev]).norm();
        let bend = (phys[prev] + phys[next] - phys[i] * 2.0).norm();
        step > 0.0 && bend > threshold * step
    };

    let reach = window.min(n - 2);

    let mut start = 0;
    for i in 1..reach {
        if is_hook(i, i - 1, i + 1) {
            start = i;
        }
    }

    let mut end = n - 1;
    for i in (n - reach..n - 1).rev() {
        if is_hook(i, i + 1, i - 1) {
            end = i;
        }
    }

    if end <= start {
        return points.to_vec();
    }
    points[start..=end].to_vec()
}
