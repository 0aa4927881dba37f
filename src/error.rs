use thiserror::Error;

/// Failures surfaced by the reconstruction engine.
///
/// Geometric degeneracies (collapsed panels, parallel planes) are not errors,
/// they simply yield no intersection.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FilamentError {
    #[error("ribbons do not intersect in 3D, no filament can be formed")]
    EmptyIntersection,

    #[error("invalid ribbon: {0}")]
    InvalidRibbon(String),

    #[error("voxel spacing must be finite and strictly positive, got {0:?}")]
    InvalidSpacing([f64; 3]),

    #[error("invalid snake: {0}")]
    InvalidSnake(String),

    #[error("either an image or a gradient field must be supplied")]
    MissingFieldSource,

    #[error("invalid parameter: {0}")]
    InvalidParams(String),
}

pub type FilamentResult<T> = std::result::Result<T, FilamentError>;
