use crate::contour::{snap_to_structure, FieldSource, GradientField, Volume};
use crate::error::{FilamentError, FilamentResult};
use crate::geometry::{intersect_ribbons, Ribbon, VoxelPoint, VoxelSpacing};
use crate::params::{AnnotatorParams, ValidSnakeParams};

use tracing::{debug, info, warn};

/// What [`AnnotationSession::delete_last_shape`] removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovedShape {
    Stroke,
    Ribbon,
    Filament,
}

/// Interactive state of one annotation layer: the stroke being drawn, the
/// finished ribbons waiting for a partner, and the committed filaments.
#[derive(Debug, Clone)]
pub struct AnnotationSession {
    params: AnnotatorParams,
    snake: ValidSnakeParams,
    spacing: VoxelSpacing,
    image: Option<Volume>,
    gradient: Option<GradientField>,
    near: Vec<VoxelPoint>,
    far: Vec<VoxelPoint>,
    ribbons: Vec<Ribbon>,
    filaments: Vec<Vec<VoxelPoint>>,
}

impl AnnotationSession {
    /// Starts a session. At least one of `image` and `gradient` is needed;
    /// the gradient is used when both are given. A time series image is
    /// sampled at the frame named by the rungs' time coordinate.
    pub fn new(
        params: AnnotatorParams,
        image: Option<Volume>,
        gradient: Option<GradientField>,
    ) -> FilamentResult<Self> {
        if image.is_none() && gradient.is_none() {
            return Err(FilamentError::MissingFieldSource);
        }
        let params = params.validated()?;
        let snake = params.snake.clone().validated()?;
        let spacing = params.spacing()?;
        Ok(Self {
            params,
            snake,
            spacing,
            image,
            gradient,
            near: Vec::new(),
            far: Vec::new(),
            ribbons: Vec::new(),
            filaments: Vec::new(),
        })
    }

    pub fn params(&self) -> &AnnotatorParams {
        &self.params
    }

    pub fn filaments(&self) -> &[Vec<VoxelPoint>] {
        &self.filaments
    }

    pub fn pending_rungs(&self) -> usize {
        self.near.len()
    }

    pub fn pending_ribbons(&self) -> usize {
        self.ribbons.len()
    }

    /// Appends one near/far pair to the stroke being drawn.
    pub fn add_rung(&mut self, near: VoxelPoint, far: VoxelPoint) -> FilamentResult<()> {
        if !near.is_finite() || !far.is_finite() {
            return Err(FilamentError::InvalidRibbon(
                "rung has a non-finite coordinate".to_string(),
            ));
        }
        self.near.push(near);
        self.far.push(far);
        Ok(())
    }

    pub fn delete_last_rung(&mut self) -> bool {
        let removed = self.near.pop().is_some();
        self.far.pop();
        removed
    }

    /// Closes the current stroke.
    ///
    /// Once two ribbons are pending they are intersected, the curve is
    /// refined onto the image and committed as a filament, which is
    /// returned. Both ribbons are consumed whether or not this succeeds, so
    /// after an [`FilamentError::EmptyIntersection`] the user simply redraws.
    pub fn finish_stroke(&mut self) -> FilamentResult<Option<Vec<VoxelPoint>>> {
        if !self.near.is_empty() {
            let near = std::mem::take(&mut self.near);
            let far = std::mem::take(&mut self.far);
            self.ribbons.push(Ribbon::new(near, far)?);
            debug!(pending = self.ribbons.len(), "stroke closed");
        }
        if self.ribbons.len() < 2 {
            return Ok(None);
        }

        let second = self.ribbons.pop();
        let first = self.ribbons.pop();
        let (Some(first), Some(second)) = (first, second) else {
            return Ok(None);
        };

        match self.build_filament(&first, &second) {
            Ok(filament) => {
                info!(points = filament.len(), total = self.filaments.len() + 1, "filament added");
                self.filaments.push(filament.clone());
                Ok(Some(filament))
            }
            Err(e) => {
                warn!(error = %e, "discarding ribbon pair");
                Err(e)
            }
        }
    }

    fn build_filament(&self, first: &Ribbon, second: &Ribbon) -> FilamentResult<Vec<VoxelPoint>> {
        let coarse = intersect_ribbons(first, second, &self.spacing)?;
        let source = FieldSource::from_options(self.image.as_ref(), self.gradient.as_ref())?;
        snap_to_structure(&coarse, source, &self.spacing, &self.snake)
    }

    /// Removes the most recent shape: the stroke in progress if any, else the
    /// last pending ribbon, else the last filament.
    pub fn delete_last_shape(&mut self) -> Option<RemovedShape> {
        if !self.near.is_empty() {
            self.near.clear();
            self.far.clear();
            Some(RemovedShape::Stroke)
        } else if self.ribbons.pop().is_some() {
            Some(RemovedShape::Ribbon)
        } else {
            self.filaments.pop().map(|_| RemovedShape::Filament)
        }
    }

    pub fn delete_first_filament_point(&mut self) -> Option<VoxelPoint> {
        let filament = self.filaments.last_mut()?;
        if filament.is_empty() {
            return None;
        }
        Some(filament.remove(0))
    }

    pub fn delete_last_filament_point(&mut self) -> Option<VoxelPoint> {
        self.filaments.last_mut()?.pop()
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use crate::contour::build_gradient;
    use crate::params::SnakeParams;
    use crate::utils::test_utils::crossing_ribbons;
    use ndarray::{Array3, Array4};

    fn session() -> AnnotationSession {
        let params = AnnotatorParams {
            snake: SnakeParams {
                n_iter: 5,
                n_interp: 2,
                ..SnakeParams::default()
            },
            ..AnnotatorParams::default()
        };
        let grad = build_gradient(&Array3::zeros((12, 90, 80)), &VoxelSpacing::isotropic()).unwrap();
        AnnotationSession::new(params, None, Some(grad)).unwrap()
    }

    fn draw(session: &mut AnnotationSession, ribbon: &Ribbon) {
        for (n, f) in ribbon.near().iter().zip(ribbon.far()) {
            session.add_rung(*n, *f).unwrap();
        }
    }

    #[test]
    fn test_two_strokes_make_a_filament() {
        let (r1, r2) = crossing_ribbons();
        let mut session = session();

        draw(&mut session, &r1);
        assert_eq!(session.finish_stroke(), Ok(None));
        assert_eq!(session.pending_ribbons(), 1);

        draw(&mut session, &r2);
        let filament = session.finish_stroke().unwrap().unwrap();
        assert_eq!(session.pending_ribbons(), 0);
        assert_eq!(session.filaments().len(), 1);
        assert_eq!(session.filaments()[0], filament);
        // 4-point coarse curve resampled with 2 steps per segment
        assert_eq!(filament.len(), 7);
    }

    #[test]
    fn test_disjoint_strokes_are_discarded() {
        let (r1, _) = crossing_ribbons();
        let shifted = Ribbon::new(
            r1.near().iter().map(|p| VoxelPoint::new(p.z, p.y, p.x + 500.0)).collect(),
            r1.far().iter().map(|p| VoxelPoint::new(p.z, p.y - 20.0, p.x + 500.0)).collect(),
        )
        .unwrap();
        let mut session = session();

        draw(&mut session, &r1);
        session.finish_stroke().unwrap();
        draw(&mut session, &shifted);
        assert_eq!(session.finish_stroke(), Err(FilamentError::EmptyIntersection));
        assert_eq!(session.pending_ribbons(), 0);
        assert!(session.filaments().is_empty());
    }

    #[test]
    fn test_single_rung_stroke_is_rejected() {
        let mut session = session();
        session
            .add_rung(VoxelPoint::new(0.0, 1.0, 1.0), VoxelPoint::new(10.0, 1.0, 1.0))
            .unwrap();
        assert!(matches!(session.finish_stroke(), Err(FilamentError::InvalidRibbon(_))));
        assert_eq!(session.pending_rungs(), 0);
        assert_eq!(session.pending_ribbons(), 0);
    }

    #[test]
    fn test_delete_last_shape_order() {
        let (r1, r2) = crossing_ribbons();
        let mut session = session();
        draw(&mut session, &r1);
        session.finish_stroke().unwrap();
        draw(&mut session, &r2);
        session.finish_stroke().unwrap();

        draw(&mut session, &r1);
        session.finish_stroke().unwrap();
        draw(&mut session, &r2);
        assert!(session.delete_last_rung());
        assert_eq!(session.pending_rungs(), r2.n_rungs() - 1);

        assert_eq!(session.delete_last_shape(), Some(RemovedShape::Stroke));
        assert_eq!(session.delete_last_shape(), Some(RemovedShape::Ribbon));
        assert_eq!(session.delete_last_shape(), Some(RemovedShape::Filament));
        assert_eq!(session.delete_last_shape(), None);
        assert!(!session.delete_last_rung());
    }

    #[test]
    fn test_trim_filament_points() {
        let (r1, r2) = crossing_ribbons();
        let mut session = session();
        assert_eq!(session.delete_last_filament_point(), None);

        draw(&mut session, &r1);
        session.finish_stroke().unwrap();
        draw(&mut session, &r2);
        let filament = session.finish_stroke().unwrap().unwrap();

        assert_eq!(session.delete_first_filament_point(), Some(filament[0]));
        assert_eq!(
            session.delete_last_filament_point(),
            Some(filament[filament.len() - 1])
        );
        assert_eq!(session.filaments()[0], filament[1..filament.len() - 1].to_vec());
    }

    #[test]
    fn test_series_session_keeps_stroke_time() {
        let (r1, r2) = crossing_ribbons();
        let at_t1 = |p: &VoxelPoint| VoxelPoint { t: Some(1.0), ..*p };
        let params = AnnotatorParams {
            snake: SnakeParams {
                n_iter: 5,
                n_interp: 2,
                ..SnakeParams::default()
            },
            ..AnnotatorParams::default()
        };
        let series = Array4::<f64>::zeros((2, 12, 90, 80));
        let mut session = AnnotationSession::new(params, Some(series.into()), None).unwrap();

        for ribbon in [&r1, &r2] {
            for (n, f) in ribbon.near().iter().zip(ribbon.far()) {
                session.add_rung(at_t1(n), at_t1(f)).unwrap();
            }
            session.finish_stroke().unwrap();
        }

        assert_eq!(session.filaments().len(), 1);
        assert!(session.filaments()[0].iter().all(|p| p.t == Some(1.0)));
    }

    #[test]
    fn test_series_session_rejects_missing_frame() {
        let (r1, r2) = crossing_ribbons();
        let at_t5 = |p: &VoxelPoint| VoxelPoint { t: Some(5.0), ..*p };
        let series = Array4::<f64>::zeros((2, 12, 90, 80));
        let mut session = AnnotationSession::new(AnnotatorParams::default(), Some(series.into()), None).unwrap();

        for (n, f) in r1.near().iter().zip(r1.far()) {
            session.add_rung(at_t5(n), at_t5(f)).unwrap();
        }
        assert_eq!(session.finish_stroke(), Ok(None));
        for (n, f) in r2.near().iter().zip(r2.far()) {
            session.add_rung(at_t5(n), at_t5(f)).unwrap();
        }
        assert!(matches!(session.finish_stroke(), Err(FilamentError::InvalidSnake(_))));
        assert!(session.filaments().is_empty());
    }

    #[test]
    fn test_invalid_snake_params_are_rejected() {
        let params = AnnotatorParams {
            snake: SnakeParams {
                end_coef: 2.0,
                ..SnakeParams::default()
            },
            ..AnnotatorParams::default()
        };
        let grad = build_gradient(&Array3::zeros((4, 4, 4)), &VoxelSpacing::isotropic()).unwrap();
        assert!(matches!(
            AnnotationSession::new(params, None, Some(grad)),
            Err(FilamentError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_session_needs_a_field_source() {
        assert!(matches!(
            AnnotationSession::new(AnnotatorParams::default(), None, None),
            Err(FilamentError::MissingFieldSource)
        ));
    }
}
