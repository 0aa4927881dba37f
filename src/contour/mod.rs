pub mod evolve;
pub mod field;
pub mod preprocessing;

pub use evolve::evolve;
pub use field::{build_gradient, crop_and_mask, smooth_volume, GradientField, VolumePatch};
pub use preprocessing::{interpolate_curve, remove_corners};

use crate::error::{FilamentError, FilamentResult};
use crate::geometry::{VoxelPoint, VoxelSpacing};
use crate::params::ValidSnakeParams;

use ndarray::{Array3, Array4, ArrayView3, Axis};
use tracing::{debug, info};

/// Where the external force comes from.
#[derive(Debug, Clone, Copy)]
pub enum FieldSource<'a> {
    /// Raw volume; cropped, masked and smoothed around the snake first.
    Image(&'a Array3<f64>),
    /// Raw (t, z, y, x) series; the frame is the one named by the curve's
    /// time coordinate, then handled like [`FieldSource::Image`].
    Series(&'a Array4<f64>),
    /// Pre-computed gradient, used as is.
    Gradient(&'a GradientField),
}

impl<'a> FieldSource<'a> {
    /// Picks the gradient when both are given.
    pub fn from_options(
        image: Option<&'a Volume>,
        gradient: Option<&'a GradientField>,
    ) -> FilamentResult<Self> {
        match (gradient, image) {
            (Some(g), _) => Ok(Self::Gradient(g)),
            (None, Some(volume)) => Ok(volume.as_source()),
            (None, None) => Err(FilamentError::MissingFieldSource),
        }
    }
}

/// An owned image: a single 3D volume or a time series of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Volume {
    Single(Array3<f64>),
    Series(Array4<f64>),
}

impl Volume {
    pub fn as_source(&self) -> FieldSource<'_> {
        match self {
            Volume::Single(image) => FieldSource::Image(image),
            Volume::Series(series) => FieldSource::Series(series),
        }
    }
}

impl From<Array3<f64>> for Volume {
    fn from(image: Array3<f64>) -> Self {
        Volume::Single(image)
    }
}

impl From<Array4<f64>> for Volume {
    fn from(series: Array4<f64>) -> Self {
        Volume::Series(series)
    }
}

/// Refines a coarse curve onto the bright structure it was drawn over.
///
/// The curve is resampled by `n_interp`, relaxed as an active contour and,
/// when its ends were free to move, trimmed of end hooks. With
/// `end_coef == 0` the first and last point come back unchanged.
pub fn snap_to_structure(
    curve: &[VoxelPoint],
    source: FieldSource<'_>,
    spacing: &VoxelSpacing,
    params: &ValidSnakeParams,
) -> FilamentResult<Vec<VoxelPoint>> {
    validate_snake(curve)?;

    let mut snake = interpolate_curve(curve, params.n_interp);
    info!(
        input = curve.len(),
        points = snake.len(),
        n_iter = params.n_iter,
        "refining filament"
    );

    let patch_field;
    let field = match source {
        FieldSource::Gradient(g) => g,
        FieldSource::Image(image) => {
            patch_field = image_field(image.view(), &snake, spacing, params)?;
            &patch_field
        }
        FieldSource::Series(series) => {
            let t = frame_index(curve, series.len_of(Axis(0)))?;
            debug!(frame = t, "using time point");
            patch_field = image_field(series.index_axis(Axis(0), t), &snake, spacing, params)?;
            &patch_field
        }
    };

    evolve(&mut snake, field, spacing, params);

    // hooks only form on ends that were free to move
    if params.remove_corners && params.end_coef > 0.0 && params.n_iter > 0 {
        let before = snake.len();
        snake = remove_corners(&snake, spacing, params.corner_window, params.corner_threshold);
        if snake.len() < before {
            debug!(removed = before - snake.len(), "trimmed end hooks");
        }
    }
    Ok(snake)
}

/// Gradient of the masked, smoothed patch around `snake`, placed back in
/// volume coordinates.
fn image_field(
    image: ArrayView3<'_, f64>,
    snake: &[VoxelPoint],
    spacing: &VoxelSpacing,
    params: &ValidSnakeParams,
) -> FilamentResult<GradientField> {
    let patch = crop_and_mask(
        &image,
        snake,
        params.crop_radius,
        params.sigma_voxels(spacing),
        params.mask_factor,
        params.mask_core_radius,
    )?;
    let s = image.shape();
    debug!(origin = ?patch.origin, shape = ?patch.data.shape(), "cropped patch");
    build_gradient(&patch.data, spacing)?.placed_at(patch.origin, [s[0], s[1], s[2]])
}

/// Frame of a time series named by the curve's (shared) time coordinate.
fn frame_index(curve: &[VoxelPoint], n_frames: usize) -> FilamentResult<usize> {
    let Some(t) = curve.first().and_then(|p| p.t) else {
        return Err(FilamentError::InvalidSnake(
            "a time series needs points with a time coordinate".to_string(),
        ));
    };
    let frame = t.round();
    if (t - frame).abs() > 1e-6 || frame < 0.0 || frame >= n_frames as f64 {
        return Err(FilamentError::InvalidSnake(format!(
            "time coordinate {t} does not name one of {n_frames} frames"
        )));
    }
    Ok(frame as usize)
}

fn validate_snake(curve: &[VoxelPoint]) -> FilamentResult<()> {
    if curve.len() < 2 {
        return Err(FilamentError::InvalidSnake(format!(
            "at least 2 points are required, got {}",
            curve.len()
        )));
    }
    if let Some(i) = curve.iter().position(|p| !p.is_finite()) {
        return Err(FilamentError::InvalidSnake(format!(
            "point {i} has a non-finite coordinate"
        )));
    }
    if let Some(i) = curve.iter().position(|p| p.t != curve[0].t) {
        return Err(FilamentError::InvalidSnake(format!(
            "point {i} has a different time coordinate than point 0"
        )));
    }
    Ok(())
}
