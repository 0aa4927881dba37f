use crate::contour::field::smooth_volume;
use crate::geometry::{Ribbon, VoxelPoint};

use ndarray::Array3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }
    let step = (stop - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

/// Two ribbons drawn from crossing viewpoints: ribbon 1 tilts from y=73 up
/// to y=85 while ribbon 2 tilts the other way, so they meet along the
/// line z=5, y=79.
pub fn crossing_ribbons() -> (Ribbon, Ribbon) {
    let x1 = [12.0, 25.0, 38.0, 55.0, 69.0];
    let x2 = [15.0, 29.0, 41.0, 54.0, 61.0, 72.0];

    let ribbon1 = Ribbon::new(
        x1.iter().map(|&x| VoxelPoint::new(0.0, 73.0, x)).collect(),
        x1.iter().map(|&x| VoxelPoint::new(10.0, 85.0, x)).collect(),
    )
    .unwrap();
    let ribbon2 = Ribbon::new(
        x2.iter().map(|&x| VoxelPoint::new(0.0, 85.0, x)).collect(),
        x2.iter().map(|&x| VoxelPoint::new(10.0, 73.0, x)).collect(),
    )
    .unwrap();
    (ribbon1, ribbon2)
}

/// Voxel centreline of a sinusoidal filament crossing a (10, 50, 50)
/// volume, sampled at `n` positions.
pub fn filament_centerline(n: usize) -> Vec<VoxelPoint> {
    let z = linspace(2.0, 8.0, n);
    let y = linspace(10.0, 30.0, n);
    let x = linspace(5.0, 40.0, n);
    let phase = linspace(0.0, 5.0, n);
    (0..n)
        .map(|i| {
            VoxelPoint::new(
                z[i].round(),
                y[i].round(),
                (x[i] + 10.0 * phase[i].sin()).round(),
            )
        })
        .collect()
}

/// Bright filament on a dark background, blurred with sigma 2, together
/// with its 50-point centreline.
pub fn filament_volume() -> (Array3<f64>, Vec<VoxelPoint>) {
    let mut image = Array3::<f64>::zeros((10, 50, 50));
    for p in filament_centerline(100) {
        image[[p.z as usize, p.y as usize, p.x as usize]] = 1.0;
    }
    (smooth_volume(&image, [2.0; 3]), filament_centerline(50))
}

/// Copy of `curve` with interior points shifted uniformly within
/// `±half_width` (z, y, x). End points are kept.
pub fn perturbed(curve: &[VoxelPoint], half_width: [f64; 3], seed: u64) -> Vec<VoxelPoint> {
    let mut rng = StdRng::seed_from_u64(seed);
    let last = curve.len().saturating_sub(1);
    curve
        .iter()
        .enumerate()
        .map(|(i, p)| {
            if i == 0 || i == last {
                return *p;
            }
            let mut jitter = [0.0; 3];
            for (j, h) in jitter.iter_mut().zip(half_width) {
                *j = (rng.random_range(0.0..1.0) * 2.0 - 1.0) * h;
            }
            VoxelPoint {
                t: p.t,
                z: p.z + jitter[0],
                y: p.y + jitter[1],
                x: p.x + jitter[2],
            }
        })
        .collect()
}

/// Mean distance between index-aligned points.
pub fn mean_distance(a: &[VoxelPoint], b: &[VoxelPoint]) -> f64 {
    let total: f64 = a
        .iter()
        .zip(b)
        .map(|(p, q)| (p.coords() - q.coords()).norm())
        .sum();
    total / a.len().min(b.len()) as f64
}

#[cfg(test)]
mod test_utils_tests {
    use super::*;

    #[test]
    fn test_perturbation_spans_full_half_width() {
        let curve: Vec<VoxelPoint> = (0..200).map(|i| VoxelPoint::new(0.0, 0.0, i as f64)).collect();
        let noisy = perturbed(&curve, [2.0, 5.0, 5.0], 7);

        assert_eq!(noisy[0], curve[0]);
        assert_eq!(noisy[199], curve[199]);
        let max = |f: fn(&VoxelPoint) -> f64| {
            noisy.iter().map(f).fold(0.0_f64, |m, v| m.max(v.abs()))
        };
        let (dz, dy) = (max(|p| p.z), max(|p| p.y));
        assert!(dz <= 2.0 && dz > 1.5, "z jitter {dz}");
        assert!(dy <= 5.0 && dy > 4.0, "y jitter {dy}");
    }
}
