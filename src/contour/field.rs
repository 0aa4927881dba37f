use crate::error::{FilamentError, FilamentResult};
use crate::geometry::{VoxelPoint, VoxelSpacing};

use nalgebra::{Point3, Vector3};
use ndarray::{s, Array3, ArrayBase, ArrayView1, ArrayViewMut1, Axis, Data, Ix3, Zip};
use tracing::debug;

const SOBEL_DERIVATIVE: [f64; 3] = [-0.5, 0.0, 0.5];
const SOBEL_SMOOTH: [f64; 3] = [0.25, 0.5, 0.25];
const GAUSSIAN_TRUNCATE: f64 = 4.0;

/// Per-axis intensity derivative of an image region, in (z, y, x) order.
///
/// A field may cover only a patch of the full volume: `origin` is the
/// patch offset, `volume_shape` the extent used to keep snakes in bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientField {
    components: [Array3<f64>; 3],
    origin: [usize; 3],
    volume_shape: [usize; 3],
}

impl GradientField {
    pub fn new(
        components: [Array3<f64>; 3],
        origin: [usize; 3],
        volume_shape: [usize; 3],
    ) -> FilamentResult<Self> {
        let shape = components[0].shape().to_vec();
        if components.iter().any(|c| c.shape() != shape.as_slice()) {
            return Err(FilamentError::InvalidParams(
                "gradient components must share one shape".to_string(),
            ));
        }
        if shape.iter().any(|&n| n == 0) {
            return Err(FilamentError::InvalidParams(
                "gradient field must not be empty".to_string(),
            ));
        }
        for axis in 0..3 {
            if origin[axis] + shape[axis] > volume_shape[axis] {
                return Err(FilamentError::InvalidParams(format!(
                    "patch exceeds volume along axis {axis}"
                )));
            }
        }
        Ok(Self {
            components,
            origin,
            volume_shape,
        })
    }

    pub fn component(&self, axis: usize) -> &Array3<f64> {
        &self.components[axis]
    }

    pub fn origin(&self) -> [usize; 3] {
        self.origin
    }

    pub fn shape(&self) -> [usize; 3] {
        let s = self.components[0].shape();
        [s[0], s[1], s[2]]
    }

    pub fn volume_shape(&self) -> [usize; 3] {
        self.volume_shape
    }

    /// Gradient at the voxel nearest to `p` (volume coordinates), clipped to
    /// the covered patch.
    pub fn sample(&self, p: &Point3<f64>) -> Vector3<f64> {
        let shape = self.shape();
        let mut idx = [0usize; 3];
        for axis in 0..3 {
            let local = p[axis].round() - self.origin[axis] as f64;
            idx[axis] = local.clamp(0.0, (shape[axis] - 1) as f64) as usize;
        }
        Vector3::new(
            self.components[0][idx],
            self.components[1][idx],
            self.components[2][idx],
        )
    }

    /// Re-anchors a field computed on a cropped patch inside its volume.
    pub fn placed_at(self, origin: [usize; 3], volume_shape: [usize; 3]) -> FilamentResult<Self> {
        Self::new(self.components, origin, volume_shape)
    }

    /// Clips `p` into `[0, volume_shape - 1]` on every axis.
    pub fn clamp(&self, p: &Point3<f64>) -> Point3<f64> {
        let mut out = *p;
        for axis in 0..3 {
            out[axis] = p[axis].clamp(0.0, (self.volume_shape[axis] - 1) as f64);
        }
        out
    }
}

/// A cropped, preprocessed piece of a volume.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumePatch {
    pub data: Array3<f64>,
    pub origin: [usize; 3],
}

/// Sobel derivative along every axis, divided by the axis spacing.
/// Positive values point toward increasing intensity.
pub fn build_gradient(image: &Array3<f64>, spacing: &VoxelSpacing) -> FilamentResult<GradientField> {
    let shape = volume_shape(image)?;
    let components = [0, 1, 2].map(|axis| sobel(image, axis) / spacing.axis(axis));
    GradientField::new(components, [0; 3], shape)
}

fn sobel(image: &Array3<f64>, axis: usize) -> Array3<f64> {
    let mut out = correlate_axis(image, &SOBEL_DERIVATIVE, axis);
    for other in (0..3).filter(|&a| a != axis) {
        out = correlate_axis(&out, &SOBEL_SMOOTH, other);
    }
    out
}

/// Separable Gaussian filter with per-axis sigma in voxels.
/// Axes with a non-positive sigma are left untouched.
pub fn smooth_volume(image: &Array3<f64>, sigma: [f64; 3]) -> Array3<f64> {
    let mut out = image.clone();
    for (axis, &s) in sigma.iter().enumerate() {
        if s > 0.0 {
            out = correlate_axis(&out, &gaussian_kernel(s), axis);
        }
    }
    out
}

fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    let radius = (GAUSSIAN_TRUNCATE * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|x| (-((x * x) as f64) / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

/// 1D correlation along `axis` with an odd-length kernel, reflect boundary.
fn correlate_axis(input: &Array3<f64>, weights: &[f64], axis: usize) -> Array3<f64> {
    let radius = (weights.len() / 2) as isize;
    let n = input.len_of(Axis(axis));
    let mut out = Array3::zeros(input.raw_dim());

    Zip::from(input.lanes(Axis(axis)))
        .and(out.lanes_mut(Axis(axis)))
        .for_each(|src: ArrayView1<f64>, mut dst: ArrayViewMut1<f64>| {
            for i in 0..n {
                dst[i] = weights
                    .iter()
                    .enumerate()
                    .map(|(k, w)| w * src[reflect(i as isize + k as isize - radius, n)])
                    .sum();
            }
        });
    out
}

/// Half-sample symmetric index: `d c b a | a b c d | d c b a`.
fn reflect(i: isize, n: usize) -> usize {
    let period = 2 * n as isize;
    let m = i.rem_euclid(period);
    if m < n as isize {
        m as usize
    } else {
        (period - 1 - m) as usize
    }
}

/// Crops the volume around `snake` and suppresses bright off-curve voxels.
///
/// The box is the snake bounding box grown by `radius` voxels per axis.
/// Voxels brighter than `mask_factor` x the median intensity under the snake
/// and further than `core_radius` voxels from every snake point are clipped
/// to that threshold, then the patch is smoothed with `sigma` (voxels).
pub fn crop_and_mask<S: Data<Elem = f64>>(
    image: &ArrayBase<S, Ix3>,
    snake: &[VoxelPoint],
    radius: [usize; 3],
    sigma: [f64; 3],
    mask_factor: f64,
    core_radius: f64,
) -> FilamentResult<VolumePatch> {
    let shape = volume_shape(image)?;
    if snake.is_empty() {
        return Err(FilamentError::InvalidSnake("snake has no points".to_string()));
    }

    let voxels: Vec<[usize; 3]> = snake.iter().map(|p| nearest_voxel(p, shape)).collect();

    let mut lo = [usize::MAX; 3];
    let mut hi = [0usize; 3];
    for v in &voxels {
        for axis in 0..3 {
            lo[axis] = lo[axis].min(v[axis]);
            hi[axis] = hi[axis].max(v[axis]);
        }
    }
    let origin = [0, 1, 2].map(|axis| lo[axis].saturating_sub(radius[axis]));
    let end = [0, 1, 2].map(|axis| (hi[axis] + radius[axis] + 1).min(shape[axis]));

    let mut data = image
        .slice(s![origin[0]..end[0], origin[1]..end[1], origin[2]..end[2]])
        .to_owned();

    if mask_factor > 0.0 {
        let mut samples: Vec<f64> = voxels.iter().map(|v| image[*v]).collect();
        let threshold = mask_factor * median(&mut samples);
        if threshold > 0.0 {
            let core = core_mask(data.raw_dim(), origin, &voxels, core_radius);
            let mut clipped = 0usize;
            Zip::from(&mut data).and(&core).for_each(|value, &protected| {
                if !protected && *value > threshold {
                    *value = threshold;
                    clipped += 1;
                }
            });
            debug!(threshold, clipped, "masked bright voxels around snake");
        }
    }

    Ok(VolumePatch {
        data: smooth_volume(&data, sigma),
        origin,
    })
}

/// Marks patch voxels within `core_radius` of any snake voxel.
fn core_mask(
    dim: ndarray::Ix3,
    origin: [usize; 3],
    voxels: &[[usize; 3]],
    core_radius: f64,
) -> Array3<bool> {
    let mut core = Array3::from_elem(dim, false);
    let shape = [dim[0], dim[1], dim[2]];
    let r = core_radius.floor() as isize;
    let r2 = core_radius * core_radius;

    for v in voxels {
        for dz in -r..=r {
            for dy in -r..=r {
                for dx in -r..=r {
                    if ((dz * dz + dy * dy + dx * dx) as f64) > r2 {
                        continue;
                    }
                    let local = [
                        v[0] as isize + dz - origin[0] as isize,
                        v[1] as isize + dy - origin[1] as isize,
                        v[2] as isize + dx - origin[2] as isize,
                    ];
                    if (0..3).all(|a| local[a] >= 0 && (local[a] as usize) < shape[a]) {
                        core[[local[0] as usize, local[1] as usize, local[2] as usize]] = true;
                    }
                }
            }
        }
    }
    core
}

fn nearest_voxel(p: &VoxelPoint, shape: [usize; 3]) -> [usize; 3] {
    let c = p.coords();
    [0, 1, 2].map(|axis| c[axis].round().clamp(0.0, (shape[axis] - 1) as f64) as usize)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        0.5 * (values[n / 2 - 1] + values[n / 2])
    }
}

fn volume_shape<S: Data<Elem = f64>>(image: &ArrayBase<S, Ix3>) -> FilamentResult<[usize; 3]> {
    let s = image.shape();
    if s.iter().any(|&n| n == 0) {
        return Err(FilamentError::InvalidParams(format!(
            "image must not be empty, got shape {s:?}"
        )));
    }
    Ok([s[0], s[1], s[2]])
}
