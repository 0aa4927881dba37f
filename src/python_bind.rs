// File: src/python_bind.rs
use ndarray::{Array3, Array4};
use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;

use crate::contour::{self, FieldSource, GradientField, Volume};
use crate::error::FilamentError;
use crate::geometry::{self, Ribbon, VoxelPoint, VoxelSpacing};
use crate::params::SnakeParams;

type PyPoints = Vec<Vec<f64>>;

fn to_py_err(e: FilamentError) -> PyErr {
    match e {
        FilamentError::EmptyIntersection => PyRuntimeError::new_err(e.to_string()),
        _ => PyValueError::new_err(e.to_string()),
    }
}

fn points_from_py(points: &[Vec<f64>]) -> PyResult<Vec<VoxelPoint>> {
    points
        .iter()
        .map(|p| VoxelPoint::from_slice(p).map_err(to_py_err))
        .collect()
}

fn points_to_py(points: &[VoxelPoint]) -> PyPoints {
    points.iter().map(|p| p.to_vec()).collect()
}

fn spacing_from_py(spacing: (f64, f64, f64)) -> PyResult<VoxelSpacing> {
    VoxelSpacing::new([spacing.0, spacing.1, spacing.2]).map_err(to_py_err)
}

fn volume_from_py(data: Vec<f64>, shape: (usize, usize, usize)) -> PyResult<Array3<f64>> {
    Array3::from_shape_vec(shape, data)
        .map_err(|e| PyValueError::new_err(format!("image does not match shape {shape:?}: {e}")))
}

/// A (z, y, x) volume or a (t, z, y, x) series, picked by `shape`.
fn image_from_py(data: Vec<f64>, shape: &[usize]) -> PyResult<Volume> {
    match *shape {
        [z, y, x] => Ok(volume_from_py(data, (z, y, x))?.into()),
        [t, z, y, x] => Array4::from_shape_vec((t, z, y, x), data)
            .map(Volume::from)
            .map_err(|e| PyValueError::new_err(format!("image does not match shape {shape:?}: {e}"))),
        _ => Err(PyValueError::new_err(format!(
            "image shape must have 3 or 4 axes, got {shape:?}"
        ))),
    }
}

/// Per-axis image derivative, (z, y, x) order.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyGradientField {
    pub inner: GradientField,
}

#[pymethods]
impl PyGradientField {
    #[getter]
    fn shape(&self) -> (usize, usize, usize) {
        let s = self.inner.shape();
        (s[0], s[1], s[2])
    }

    #[getter]
    fn origin(&self) -> (usize, usize, usize) {
        let o = self.inner.origin();
        (o[0], o[1], o[2])
    }

    #[getter]
    fn volume_shape(&self) -> (usize, usize, usize) {
        let s = self.inner.volume_shape();
        (s[0], s[1], s[2])
    }

    /// Flat row-major copy of the derivative along `axis` (0 = z).
    fn component(&self, axis: usize) -> PyResult<Vec<f64>> {
        if axis > 2 {
            return Err(PyValueError::new_err(format!("axis must be 0, 1 or 2, got {axis}")));
        }
        Ok(self.inner.component(axis).iter().copied().collect())
    }

    fn __repr__(&self) -> String {
        format!(
            "GradientField(shape={:?}, origin={:?})",
            self.inner.shape(),
            self.inner.origin()
        )
    }
}

/// Intersects two ribbons given as `(near_points, far_points)`.
#[pyfunction]
#[pyo3(signature = (ribbon1, ribbon2, spacing = (1.0, 1.0, 1.0)))]
fn intersect_ribbons(
    ribbon1: (PyPoints, PyPoints),
    ribbon2: (PyPoints, PyPoints),
    spacing: (f64, f64, f64),
) -> PyResult<PyPoints> {
    let r1 = Ribbon::new(points_from_py(&ribbon1.0)?, points_from_py(&ribbon1.1)?).map_err(to_py_err)?;
    let r2 = Ribbon::new(points_from_py(&ribbon2.0)?, points_from_py(&ribbon2.1)?).map_err(to_py_err)?;
    let curve = geometry::intersect_ribbons(&r1, &r2, &spacing_from_py(spacing)?).map_err(to_py_err)?;
    Ok(points_to_py(&curve))
}

#[pyfunction]
#[pyo3(signature = (image, shape, spacing = (1.0, 1.0, 1.0)))]
fn build_gradient(
    image: Vec<f64>,
    shape: (usize, usize, usize),
    spacing: (f64, f64, f64),
) -> PyResult<PyGradientField> {
    let volume = volume_from_py(image, shape)?;
    let inner = contour::build_gradient(&volume, &spacing_from_py(spacing)?).map_err(to_py_err)?;
    Ok(PyGradientField { inner })
}

/// Refines a coarse curve onto the image. Pass either `image` with its
/// `shape`, or a `gradient` from `build_gradient`. A 4-axis `shape` marks a
/// time series; the curve's points then carry the frame as `t`.
#[pyfunction]
#[pyo3(signature = (
    curve,
    image = None,
    shape = None,
    gradient = None,
    spacing = (1.0, 1.0, 1.0),
    alpha = 0.01,
    beta = 0.1,
    gamma = 1.0,
    n_iter = 100usize,
    end_coef = 0.01,
    n_interp = 5usize,
    remove_corners = true
))]
#[allow(clippy::too_many_arguments)]
fn snap_to_structure(
    curve: PyPoints,
    image: Option<Vec<f64>>,
    shape: Option<Vec<usize>>,
    gradient: Option<PyRef<'_, PyGradientField>>,
    spacing: (f64, f64, f64),
    alpha: f64,
    beta: f64,
    gamma: f64,
    n_iter: usize,
    end_coef: f64,
    n_interp: usize,
    remove_corners: bool,
) -> PyResult<PyPoints> {
    let volume = match (image, shape) {
        (Some(data), Some(shape)) => Some(image_from_py(data, &shape)?),
        (Some(_), None) => return Err(PyValueError::new_err("image requires its shape")),
        _ => None,
    };
    let source = FieldSource::from_options(volume.as_ref(), gradient.as_deref().map(|g| &g.inner))
        .map_err(to_py_err)?;
    let params = SnakeParams {
        alpha,
        beta,
        gamma,
        n_iter,
        end_coef,
        n_interp,
        remove_corners,
        ..SnakeParams::default()
    }
    .validated()
    .map_err(to_py_err)?;

    let refined = contour::snap_to_structure(
        &points_from_py(&curve)?,
        source,
        &spacing_from_py(spacing)?,
        &params,
    )
    .map_err(to_py_err)?;
    Ok(points_to_py(&refined))
}

/// Orders an unordered point set into a short open path.
#[pyfunction]
#[pyo3(signature = (points, spacing = (1.0, 1.0, 1.0)))]
fn sort_points(points: PyPoints, spacing: (f64, f64, f64)) -> PyResult<PyPoints> {
    let sorted = geometry::sort_points(&points_from_py(&points)?, &spacing_from_py(spacing)?);
    Ok(points_to_py(&sorted))
}

/// This is the module importable from Python:
///
/// ```python
/// import filamentrs as fr
/// curve = fr.intersect_ribbons((near1, far1), (near2, far2), spacing=(0.3, 0.1, 0.1))
/// grad = fr.build_gradient(volume.ravel().tolist(), volume.shape, spacing=(0.3, 0.1, 0.1))
/// filament = fr.snap_to_structure(curve, gradient=grad, spacing=(0.3, 0.1, 0.1))
/// ```
#[pymodule]
fn filamentrs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add_function(wrap_pyfunction!(intersect_ribbons, m)?)?;
    m.add_function(wrap_pyfunction!(build_gradient, m)?)?;
    m.add_function(wrap_pyfunction!(snap_to_structure, m)?)?;
    m.add_function(wrap_pyfunction!(sort_points, m)?)?;
    m.add_class::<PyGradientField>()?;
    Ok(())
}
