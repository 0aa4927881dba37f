use super::{Segment, VoxelPoint};
use nalgebra::{Matrix3, Point3, Vector2, Vector3};

/// Relative tolerance, scaled by the extent of the inputs.
const REL_TOL: f64 = 1e-9;
/// Minimal sine of the angle between two planes for them to be non-parallel.
const MIN_PLANE_SINE: f64 = 1e-9;

/// Intersects two panels given as (nominally planar) point sets.
///
/// Each set is deduplicated, fitted with a least-squares plane and reduced to
/// its convex hull inside that plane. Returns the chord along which the two
/// planes cross inside both hulls, or `None` when the panels do not overlap,
/// are parallel, or collapse to fewer than 3 distinct points. The leading
/// coordinate of `p1[0]` is copied onto both ends of the chord.
pub fn intersect_tetragons(p1: &[VoxelPoint], p2: &[VoxelPoint]) -> Option<Segment> {
    let lead = p1.first()?.t;
    let pts1: Vec<Point3<f64>> = p1.iter().map(|p| p.coords()).collect();
    let pts2: Vec<Point3<f64>> = p2.iter().map(|p| p.coords()).collect();

    let scale = extent(pts1.iter().chain(pts2.iter())).max(1.0);
    let tol = REL_TOL * scale;

    let hull1 = PlanarHull::from_points(&pts1, tol)?;
    let hull2 = PlanarHull::from_points(&pts2, tol)?;

    let (origin, direction) = plane_intersection_line(&hull1, &hull2)?;

    let (lo1, hi1) = hull1.clip_line(&origin, &direction, tol)?;
    let (lo2, hi2) = hull2.clip_line(&origin, &direction, tol)?;
    let lo = lo1.max(lo2);
    let mut hi = hi1.min(hi2);
    if lo > hi + tol {
        return None;
    }
    hi = hi.max(lo);

    let start = origin + direction * lo;
    let end = origin + direction * hi;
    Some(Segment {
        start: VoxelPoint {
            t: lead,
            z: start.x,
            y: start.y,
            x: start.z,
        },
        end: VoxelPoint {
            t: lead,
            z: end.x,
            y: end.y,
            x: end.z,
        },
    })
}

/// Convex polygon living in a 3D plane, stored in 2D plane coordinates.
#[derive(Debug, Clone)]
struct PlanarHull {
    centroid: Point3<f64>,
    normal: Vector3<f64>,
    u: Vector3<f64>,
    w: Vector3<f64>,
    /// Counter-clockwise in the (u, w) basis.
    vertices: Vec<Vector2<f64>>,
}

impl PlanarHull {
    fn from_points(points: &[Point3<f64>], tol: f64) -> Option<Self> {
        let unique = dedup_points(points, tol);
        if unique.len() < 3 {
            return None;
        }

        let n = unique.len() as f64;
        let centroid = Point3::from(
            unique
                .iter()
                .fold(Vector3::zeros(), |acc, p| acc + p.coords)
                / n,
        );
        let normal = fit_plane_normal(&unique, &centroid)?;

        // in-plane basis anchored on the point furthest from the centroid
        let anchor = unique
            .iter()
            .map(|p| p - centroid)
            .max_by(|a, b| a.norm().total_cmp(&b.norm()))?;
        let u = (anchor - normal * anchor.dot(&normal)).try_normalize(tol)?;
        let w = normal.cross(&u);

        let projected: Vec<Vector2<f64>> = unique
            .iter()
            .map(|p| {
                let d = p - centroid;
                Vector2::new(d.dot(&u), d.dot(&w))
            })
            .collect();
        let vertices = convex_hull(projected, tol);
        if vertices.len() < 3 {
            return None;
        }

        Some(Self {
            centroid,
            normal,
            u,
            w,
            vertices,
        })
    }

    fn offset(&self) -> f64 {
        self.normal.dot(&self.centroid.coords)
    }

    fn to_plane(&self, v: &Vector3<f64>) -> Vector2<f64> {
        Vector2::new(v.dot(&self.u), v.dot(&self.w))
    }

    /// Cyrus-Beck clipping of `origin + t * direction` against the hull.
    /// Returns the admissible parameter range, or `None` if it is empty.
    fn clip_line(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        tol: f64,
    ) -> Option<(f64, f64)> {
        let q0 = self.to_plane(&(origin - self.centroid));
        let qd = self.to_plane(direction);

        let mut lo = f64::NEG_INFINITY;
        let mut hi = f64::INFINITY;
        let n = self.vertices.len();
        for k in 0..n {
            let a = self.vertices[k];
            let b = self.vertices[(k + 1) % n];
            let edge = b - a;
            let len = edge.norm();
            if len <= tol {
                continue;
            }
            // signed distance to the edge line, positive inside
            let num = cross2(&edge, &(q0 - a)) / len;
            let den = cross2(&edge, &qd) / len;

            if den.abs() <= REL_TOL {
                if num < -tol {
                    return None;
                }
                continue;
            }
            let t = -num / den;
            if den > 0.0 {
                lo = lo.max(t - tol / den);
            } else {
                hi = hi.min(t - tol / den);
            }
        }

        if !lo.is_finite() || !hi.is_finite() || lo > hi {
            return None;
        }
        Some((lo, hi))
    }
}

/// Point on the intersection line of both planes and its unit direction.
fn plane_intersection_line(
    a: &PlanarHull,
    b: &PlanarHull,
) -> Option<(Point3<f64>, Vector3<f64>)> {
    let d = a.normal.cross(&b.normal);
    let d2 = d.norm_squared();
    if d2.sqrt() < MIN_PLANE_SINE {
        return None;
    }
    let origin = (b.normal.cross(&d) * a.offset() + d.cross(&a.normal) * b.offset()) / d2;
    Some((Point3::from(origin), d / d2.sqrt()))
}

/// Normal of the least-squares plane through `points`.
fn fit_plane_normal(points: &[Point3<f64>], centroid: &Point3<f64>) -> Option<Vector3<f64>> {
    let covariance = points.iter().fold(Matrix3::zeros(), |acc, p| {
        let d = p - centroid;
        acc + d * d.transpose()
    });
    let eigen = covariance.symmetric_eigen();
    let (min_idx, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    eigen.eigenvectors.column(min_idx).into_owned().try_normalize(0.0)
}

fn dedup_points(points: &[Point3<f64>], tol: f64) -> Vec<Point3<f64>> {
    let mut unique: Vec<Point3<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if !unique.iter().any(|q| (q - p).norm() <= tol) {
            unique.push(*p);
        }
    }
    unique
}

fn extent<'a>(points: impl Iterator<Item = &'a Point3<f64>>) -> f64 {
    let mut min = Vector3::repeat(f64::INFINITY);
    let mut max = Vector3::repeat(f64::NEG_INFINITY);
    for p in points {
        min = min.inf(&p.coords);
        max = max.sup(&p.coords);
    }
    if min.x.is_finite() {
        (max - min).amax()
    } else {
        0.0
    }
}

fn cross2(a: &Vector2<f64>, b: &Vector2<f64>) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Andrew's monotone chain; drops collinear vertices.
fn convex_hull(mut points: Vec<Vector2<f64>>, tol: f64) -> Vec<Vector2<f64>> {
    points.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    if points.len() < 3 {
        return points;
    }
    let area_tol = tol * tol;

    let mut lower: Vec<Vector2<f64>> = Vec::new();
    for p in &points {
        while lower.len() >= 2
            && cross2(
                &(lower[lower.len() - 1] - lower[lower.len() - 2]),
                &(p - lower[lower.len() - 2]),
            ) <= area_tol
        {
            lower.pop();
        }
        lower.push(*p);
    }

    let mut upper: Vec<Vector2<f64>> = Vec::new();
    for p in points.iter().rev() {
        while upper.len() >= 2
            && cross2(
                &(upper[upper.len() - 1] - upper[upper.len() - 2]),
                &(p - upper[upper.len() - 2]),
            ) <= area_tol
        {
            upper.pop();
        }
        upper.push(*p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

#[cfg(test)]
mod tetragon_tests {
    use super::*;
    use crate::utils::test_utils::crossing_ribbons;
    use approx::assert_relative_eq;

    fn sorted_x(segment: &Segment) -> (f64, f64) {
        let (a, b) = (segment.start.x, segment.end.x);
        (a.min(b), a.max(b))
    }

    fn shifted(points: &[VoxelPoint], dz: f64, dy: f64, dx: f64) -> Vec<VoxelPoint> {
        points
            .iter()
            .map(|p| VoxelPoint::new(p.z + dz, p.y + dy, p.x + dx))
            .collect()
    }

    #[test]
    fn test_crossing_panels_give_chord() {
        let (r1, r2) = crossing_ribbons();
        // first panel of r1 with a duplicated far corner: a triangle
        let p1 = [r1.near()[0], r1.near()[1], r1.far()[1], r1.far()[1]];
        let p2 = r2.tetragon(0);

        let segment = intersect_tetragons(&p1, &p2).expect("panels cross");
        for p in [segment.start, segment.end] {
            assert_relative_eq!(p.z, 5.0, epsilon = 1e-6);
            assert_relative_eq!(p.y, 79.0, epsilon = 1e-6);
            assert_eq!(p.t, None);
        }
        let (x0, x1) = sorted_x(&segment);
        assert_relative_eq!(x0, 18.5, epsilon = 1e-6);
        assert_relative_eq!(x1, 25.0, epsilon = 1e-6);
    }

    #[test]
    fn test_intersection_is_symmetric() {
        let (r1, r2) = crossing_ribbons();
        let a = intersect_tetragons(&r1.tetragon(2), &r2.tetragon(2)).unwrap();
        let b = intersect_tetragons(&r2.tetragon(2), &r1.tetragon(2)).unwrap();
        let (a0, a1) = sorted_x(&a);
        let (b0, b1) = sorted_x(&b);
        assert_relative_eq!(a0, b0, epsilon = 1e-6);
        assert_relative_eq!(a1, b1, epsilon = 1e-6);
        assert_relative_eq!(a0, 41.0, epsilon = 1e-6);
        assert_relative_eq!(a1, 54.0, epsilon = 1e-6);
    }

    #[test]
    fn test_disjoint_panels_do_not_intersect() {
        let (r1, r2) = crossing_ribbons();
        // same planes, panels far apart along x
        assert!(intersect_tetragons(&r1.tetragon(0), &r2.tetragon(4)).is_none());
        // whole panel moved away
        let moved = shifted(&r2.tetragon(0), 0.0, 0.0, 500.0);
        assert!(intersect_tetragons(&r1.tetragon(0), &moved).is_none());
    }

    #[test]
    fn test_parallel_panels_do_not_intersect() {
        let (r1, _) = crossing_ribbons();
        let panel = r1.tetragon(1);
        let lifted = shifted(&panel, 0.0, 3.0, 0.0);
        assert!(intersect_tetragons(&panel, &lifted).is_none());
        // coplanar and overlapping is treated as no chord as well
        assert!(intersect_tetragons(&panel, &panel).is_none());
    }

    #[test]
    fn test_degenerate_panels_do_not_intersect() {
        let (_, r2) = crossing_ribbons();
        let line = [
            VoxelPoint::new(5.0, 70.0, 20.0),
            VoxelPoint::new(5.0, 80.0, 20.0),
            VoxelPoint::new(5.0, 90.0, 20.0),
            VoxelPoint::new(5.0, 90.0, 20.0),
        ];
        assert!(intersect_tetragons(&line, &r2.tetragon(0)).is_none());
        let collapsed = [VoxelPoint::new(1.0, 1.0, 1.0); 4];
        assert!(intersect_tetragons(&r2.tetragon(0), &collapsed).is_none());
    }

    #[test]
    fn test_leading_coordinate_is_carried() {
        let (r1, r2) = crossing_ribbons();
        let timed = |panel: [VoxelPoint; 4]| -> Vec<VoxelPoint> {
            panel
                .iter()
                .map(|p| VoxelPoint::with_time(3.0, p.z, p.y, p.x))
                .collect()
        };
        let segment = intersect_tetragons(&timed(r1.tetragon(0)), &timed(r2.tetragon(0))).unwrap();
        assert_eq!(segment.start.t, Some(3.0));
        assert_eq!(segment.end.t, Some(3.0));
        let (x0, x1) = sorted_x(&segment);
        assert_relative_eq!(x0, 15.0, epsilon = 1e-6);
        assert_relative_eq!(x1, 25.0, epsilon = 1e-6);
    }

    #[test]
    fn test_convex_hull_drops_interior_and_collinear() {
        let hull = convex_hull(
            vec![
                Vector2::new(0.0, 0.0),
                Vector2::new(2.0, 0.0),
                Vector2::new(1.0, 0.0),
                Vector2::new(2.0, 2.0),
                Vector2::new(0.0, 2.0),
                Vector2::new(1.0, 1.0),
            ],
            1e-9,
        );
        assert_eq!(hull.len(), 4);
    }
}
