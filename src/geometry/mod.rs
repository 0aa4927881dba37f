pub mod matching;
pub mod ordering;
pub mod ribbons;
pub mod tetragon;

pub use ordering::sort_points;
pub use ribbons::intersect_ribbons;
pub use tetragon::intersect_tetragons;

use crate::error::{FilamentError, FilamentResult};
use nalgebra::{Point3, Vector3};

/// A point in (z, y, x) voxel-index space.
///
/// `t` is an optional leading coordinate (time index of a 4D volume). It is
/// carried through every operation and never takes part in geometry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelPoint {
    pub t: Option<f64>,
    pub z: f64,
    pub y: f64,
    pub x: f64,
}

impl VoxelPoint {
    pub fn new(z: f64, y: f64, x: f64) -> Self {
        Self { t: None, z, y, x }
    }

    pub fn with_time(t: f64, z: f64, y: f64, x: f64) -> Self {
        Self { t: Some(t), z, y, x }
    }

    /// Builds a point from 3 (z, y, x) or 4 (t, z, y, x) coordinates.
    pub fn from_slice(coords: &[f64]) -> FilamentResult<Self> {
        match *coords {
            [z, y, x] => Ok(Self::new(z, y, x)),
            [t, z, y, x] => Ok(Self::with_time(t, z, y, x)),
            _ => Err(FilamentError::InvalidSnake(format!(
                "expected 3 or 4 coordinates per point, got {}",
                coords.len()
            ))),
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        match self.t {
            Some(t) => vec![t, self.z, self.y, self.x],
            None => vec![self.z, self.y, self.x],
        }
    }

    pub fn coords(&self) -> Point3<f64> {
        Point3::new(self.z, self.y, self.x)
    }

    /// Same leading coordinate, new spatial position.
    pub fn moved_to(&self, p: &Point3<f64>) -> Self {
        Self {
            t: self.t,
            z: p.x,
            y: p.y,
            x: p.z,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.z.is_finite() && self.y.is_finite() && self.x.is_finite()
    }
}

/// Physical voxel size per axis (z, y, x).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelSpacing([f64; 3]);

impl VoxelSpacing {
    pub fn new(spacing: [f64; 3]) -> FilamentResult<Self> {
        if spacing.iter().all(|s| s.is_finite() && *s > 0.0) {
            Ok(Self(spacing))
        } else {
            Err(FilamentError::InvalidSpacing(spacing))
        }
    }

    pub fn isotropic() -> Self {
        Self([1.0; 3])
    }

    pub fn as_array(&self) -> [f64; 3] {
        self.0
    }

    pub fn axis(&self, axis: usize) -> f64 {
        self.0[axis]
    }

    pub fn as_vector(&self) -> Vector3<f64> {
        Vector3::new(self.0[0], self.0[1], self.0[2])
    }

    /// Position of a voxel-space point in physical units.
    pub fn physical(&self, p: &VoxelPoint) -> Vector3<f64> {
        p.coords().coords.component_mul(&self.as_vector())
    }

    pub fn distance(&self, a: &VoxelPoint, b: &VoxelPoint) -> f64 {
        (self.physical(a) - self.physical(b)).norm()
    }
}

impl Default for VoxelSpacing {
    fn default() -> Self {
        Self::isotropic()
    }
}

/// A user stroke extruded along the viewing direction: index-aligned near
/// and far points, one "rung" per drawn position.
#[derive(Debug, Clone, PartialEq)]
pub struct Ribbon {
    near: Vec<VoxelPoint>,
    far: Vec<VoxelPoint>,
}

impl Ribbon {
    pub fn new(near: Vec<VoxelPoint>, far: Vec<VoxelPoint>) -> FilamentResult<Self> {
        if near.len() != far.len() {
            return Err(FilamentError::InvalidRibbon(format!(
                "{} near points but {} far points",
                near.len(),
                far.len()
            )));
        }
        if near.len() < 2 {
            return Err(FilamentError::InvalidRibbon(format!(
                "at least 2 rungs are required, got {}",
                near.len()
            )));
        }
        if near.iter().chain(far.iter()).any(|p| !p.is_finite()) {
            return Err(FilamentError::InvalidRibbon(
                "coordinates must be finite".to_string(),
            ));
        }
        Ok(Self { near, far })
    }

    pub fn near(&self) -> &[VoxelPoint] {
        &self.near
    }

    pub fn far(&self) -> &[VoxelPoint] {
        &self.far
    }

    pub fn n_rungs(&self) -> usize {
        self.near.len()
    }

    pub fn n_panels(&self) -> usize {
        self.near.len() - 1
    }

    /// Panel `i`: (near[i], near[i+1], far[i+1], far[i]).
    pub fn tetragon(&self, i: usize) -> [VoxelPoint; 4] {
        [
            self.near[i],
            self.near[i + 1],
            self.far[i + 1],
            self.far[i],
        ]
    }
}

/// Chord where two panels cross.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: VoxelPoint,
    pub end: VoxelPoint,
}

impl Segment {
    pub fn length(&self, spacing: &VoxelSpacing) -> f64 {
        spacing.distance(&self.start, &self.end)
    }

    pub fn midpoint(&self) -> VoxelPoint {
        let mid = nalgebra::center(&self.start.coords(), &self.end.coords());
        self.start.moved_to(&mid)
    }
}
