use super::field::GradientField;
use crate::geometry::{VoxelPoint, VoxelSpacing};
use crate::params::SnakeParams;

use nalgebra::{Point3, Vector3};
use rayon::prelude::*;
use tracing::debug;

/// Relaxes `snake` in place for exactly `params.n_iter` steps.
///
/// Each step moves every point against
/// `(gamma * F_ext + F_int) / (gamma + 1)`, where `F_ext` is the negated
/// image gradient and `F_int = -alpha * d2 + beta * d4`, both scaled to a
/// unit maximum component. Steps shrink linearly from 1 to `1 / n_iter`,
/// the end points are damped by `end_coef`, and moved points are clamped
/// into the volume afterwards.
///
/// With `end_coef == 0` the end points are left exactly where they are,
/// even when they lie on or beyond the volume border.
pub fn evolve(
    snake: &mut [VoxelPoint],
    field: &GradientField,
    spacing: &VoxelSpacing,
    params: &SnakeParams,
) {
    let n = snake.len();
    if n < 2 || params.n_iter == 0 {
        return;
    }

    let mut coords: Vec<Point3<f64>> = snake.iter().map(|p| p.coords()).collect();
    let scale = spacing.as_vector();
    let gamma = params.gamma;
    let pinned = params.end_coef == 0.0;

    for it in 0..params.n_iter {
        let physical: Vec<Vector3<f64>> = coords.iter().map(|p| p.coords.component_mul(&scale)).collect();
        let (d2, d4) = derivatives(&physical);
        let internal: Vec<Vector3<f64>> = d2
            .iter()
            .zip(&d4)
            .map(|(a, b)| b * params.beta - a * params.alpha)
            .collect();
        let internal = normalized(internal);

        let external: Vec<Vector3<f64>> = coords.par_iter().map(|p| -field.sample(p)).collect();
        let external = normalized(external);

        let decay = 1.0 - it as f64 / params.n_iter as f64;

        for (i, point) in coords.iter_mut().enumerate() {
            let mut force = (external[i] * gamma + internal[i]) / (gamma + 1.0) * decay;
            if i == 0 || i == n - 1 {
                if pinned {
                    continue;
                }
                force *= params.end_coef;
            }
            *point = field.clamp(&(*point - force));
        }
    }

    debug!(points = n, iterations = params.n_iter, "snake relaxed");

    for (p, c) in snake.iter_mut().zip(&coords) {
        *p = p.moved_to(c);
    }
}

/// Second and fourth differences along the curve with two mirrored points
/// padded at each end: `x1 x0 | x0 .. xn | xn x(n-1)`.
pub fn derivatives(x: &[Vector3<f64>]) -> (Vec<Vector3<f64>>, Vec<Vector3<f64>>) {
    let n = x.len();
    let last = n - 1;
    let at = |i: isize| -> Vector3<f64> {
        let idx = if i < 0 {
            (-i - 1) as usize
        } else if i as usize > last {
            2 * n - 1 - i as usize
        } else {
            i as usize
        };
        x[idx.min(last)]
    };

    let mut d2 = Vec::with_capacity(n);
    let mut d4 = Vec::with_capacity(n);
    for i in 0..n as isize {
        let (m2, m1, c, p1, p2) = (at(i - 2), at(i - 1), at(i), at(i + 1), at(i + 2));
        d2.push(m1 + p1 - c * 2.0);
        d4.push(m2 - m1 * 4.0 + c * 6.0 - p1 * 4.0 + p2);
    }
    (d2, d4)
}

/// Scales forces so the largest absolute component is 1.
/// A field with no non-zero component contributes nothing.
fn normalized(forces: Vec<Vector3<f64>>) -> Vec<Vector3<f64>> {
    let max = forces.iter().map(|f| f.amax()).fold(0.0, f64::max);
    if max > 0.0 && max.is_finite() {
        forces.into_iter().map(|f| f / max).collect()
    } else {
        vec![Vector3::zeros(); forces.len()]
    }
}
