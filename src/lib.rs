//! Filament reconstruction from two hand-drawn views.
//!
//! A user traces a filament twice from different viewing angles. Each trace,
//! extruded along its viewing ray, becomes a [`Ribbon`]; the intersection of
//! both ribbons is a coarse 3D curve ([`intersect_ribbons`]) that is then
//! relaxed onto the bright structure of the image by an active contour
//! ([`snap_to_structure`]).
//!
//! All coordinates are voxel indices in (z, y, x) order, optionally with a
//! leading time coordinate that is carried through untouched.

pub mod contour;
pub mod error;
pub mod geometry;
pub mod io;
pub mod params;
pub mod session;
mod utils;

#[cfg(feature = "python")]
mod python_bind;

pub use contour::{build_gradient, snap_to_structure, FieldSource, GradientField, Volume};
pub use error::{FilamentError, FilamentResult};
pub use geometry::{
    intersect_ribbons, intersect_tetragons, sort_points, Ribbon, Segment, VoxelPoint, VoxelSpacing,
};
pub use io::{read_annotations_csv, write_annotations_csv};
pub use params::{AnnotatorParams, SnakeParams, ValidSnakeParams};
pub use session::{AnnotationSession, RemovedShape};
