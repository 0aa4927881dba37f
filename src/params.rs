use crate::error::{FilamentError, FilamentResult};
use crate::geometry::VoxelSpacing;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::ops::Deref;
use std::path::Path;

/// Active-contour settings. Construct with [`SnakeParams::default`] and
/// struct update syntax, then call [`SnakeParams::validated`] once to get
/// the [`ValidSnakeParams`] the refinement takes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnakeParams {
    /// Weight of the second derivative (elasticity).
    pub alpha: f64,
    /// Weight of the fourth derivative (rigidity).
    pub beta: f64,
    /// Weight of the image force relative to the internal force.
    pub gamma: f64,
    pub n_iter: usize,
    /// Force multiplier on the first and last point, 0 pins them.
    pub end_coef: f64,
    /// Points per original segment after interpolation, 0 or 1 disables it.
    pub n_interp: usize,
    pub remove_corners: bool,
    /// How many points at each end are inspected for hooks.
    pub corner_window: usize,
    /// Ratio of second to first difference above which a point is a hook.
    pub corner_threshold: f64,
    /// Margin (z, y, x) in voxels around the snake when cropping the image.
    pub crop_radius: [usize; 3],
    /// Gaussian smoothing of the cropped patch, in physical units.
    pub sigma_um: f64,
    /// Bright voxels above `mask_factor` x median snake intensity are
    /// clipped. 0 disables masking.
    pub mask_factor: f64,
    /// Voxels closer than this to the snake are never masked.
    pub mask_core_radius: f64,
}

impl Default for SnakeParams {
    fn default() -> Self {
        Self {
            alpha: 0.01,
            beta: 0.1,
            gamma: 1.0,
            n_iter: 100,
            end_coef: 0.01,
            n_interp: 5,
            remove_corners: true,
            corner_window: 5,
            corner_threshold: 1.0,
            crop_radius: [5, 10, 10],
            sigma_um: 1.0,
            mask_factor: 3.0,
            mask_core_radius: 2.0,
        }
    }
}

impl SnakeParams {
    pub fn validated(self) -> FilamentResult<ValidSnakeParams> {
        self.check()?;
        Ok(ValidSnakeParams(self))
    }

    fn check(&self) -> FilamentResult<()> {
        let non_negative = [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("gamma", self.gamma),
            ("sigma_um", self.sigma_um),
            ("mask_factor", self.mask_factor),
            ("mask_core_radius", self.mask_core_radius),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(FilamentError::InvalidParams(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.end_coef) {
            return Err(FilamentError::InvalidParams(format!(
                "end_coef must lie in [0, 1], got {}",
                self.end_coef
            )));
        }
        if !self.corner_threshold.is_finite() || self.corner_threshold <= 0.0 {
            return Err(FilamentError::InvalidParams(format!(
                "corner_threshold must be positive, got {}",
                self.corner_threshold
            )));
        }
        if self.corner_window < 2 {
            return Err(FilamentError::InvalidParams(format!(
                "corner_window must be at least 2, got {}",
                self.corner_window
            )));
        }
        Ok(())
    }

    /// Smoothing sigma per axis in voxels.
    pub fn sigma_voxels(&self, spacing: &VoxelSpacing) -> [f64; 3] {
        let s = spacing.as_array();
        [
            self.sigma_um / s[0],
            self.sigma_um / s[1],
            self.sigma_um / s[2],
        ]
    }
}

/// [`SnakeParams`] that passed validation. Read-only; edit a copy of the
/// inner record and validate it again to change anything.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidSnakeParams(SnakeParams);

impl ValidSnakeParams {
    pub fn get(&self) -> &SnakeParams {
        &self.0
    }

    pub fn into_inner(self) -> SnakeParams {
        self.0
    }
}

impl Deref for ValidSnakeParams {
    type Target = SnakeParams;

    fn deref(&self) -> &SnakeParams {
        &self.0
    }
}

impl TryFrom<SnakeParams> for ValidSnakeParams {
    type Error = FilamentError;

    fn try_from(params: SnakeParams) -> FilamentResult<Self> {
        params.validated()
    }
}

/// Parameters of an annotation session, as stored next to the annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorParams {
    pub voxel_size_xy: f64,
    pub voxel_size_z: f64,
    /// Display width of drawn shapes.
    pub line_width: f64,
    #[serde(flatten)]
    pub snake: SnakeParams,
}

impl Default for AnnotatorParams {
    fn default() -> Self {
        Self {
            voxel_size_xy: 1.0,
            voxel_size_z: 1.0,
            line_width: 1.0,
            snake: SnakeParams::default(),
        }
    }
}

impl AnnotatorParams {
    pub fn validated(self) -> FilamentResult<Self> {
        self.spacing()?;
        if !self.line_width.is_finite() || self.line_width <= 0.0 {
            return Err(FilamentError::InvalidParams(format!(
                "line_width must be positive, got {}",
                self.line_width
            )));
        }
        self.snake.check()?;
        Ok(self)
    }

    /// Voxel spacing in (z, y, x) order.
    pub fn spacing(&self) -> FilamentResult<VoxelSpacing> {
        VoxelSpacing::new([self.voxel_size_z, self.voxel_size_xy, self.voxel_size_xy])
    }

    /// Reads parameters from a `.toml` file, or JSON for any other extension.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading parameters from {}", path.display()))?;
        let params: Self = if is_toml(path) {
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        } else {
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        };
        Ok(params.validated()?)
    }

    /// Writes parameters, creating parent directories as needed.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let text = if is_toml(path) {
            toml::to_string_pretty(self)?
        } else {
            serde_json::to_string_pretty(self)?
        };
        fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}
