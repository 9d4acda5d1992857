//! Pose from four marker-corner correspondences.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, SMatrix, SVector, Vector3};
use planar_tracker_core::{
    ensure_non_negative, ensure_positive, homography_from_4pt, CameraModel, ConfigError, Pose,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::reprojection::reprojection_rmse;

/// Black-box "4 correspondences + intrinsics -> pose" solver.
///
/// `object[i]` (marker frame) must correspond to `image[i]` (distorted
/// pixels). `initial`, when given, is a nearby pose to start from.
pub trait PoseSolver: Send {
    fn solve(
        &self,
        object: &[Point3<f64>; 4],
        image: &[Point2<f64>; 4],
        camera: &CameraModel,
        initial: Option<&Pose>,
    ) -> Option<Pose>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Levenberg-Marquardt iteration cap.
    pub max_iterations: usize,
    /// Warm-start results worse than this are re-solved from the
    /// homography initialization as well.
    pub reinit_rmse_px: f64,
    /// Stop once the relative cost decrease falls below this.
    pub convergence_eps: f64,
    pub initial_lambda: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            max_iterations: 30,
            reinit_rmse_px: 2.0,
            convergence_eps: 1e-10,
            initial_lambda: 1e-3,
        }
    }
}

impl SolverParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("solver.reinit_rmse_px", self.reinit_rmse_px)?;
        ensure_non_negative("solver.convergence_eps", self.convergence_eps)?;
        ensure_positive("solver.initial_lambda", self.initial_lambda)
    }
}

/// Homography-initialized, Levenberg-Marquardt-refined planar PnP.
#[derive(Clone, Debug, Default)]
pub struct PlanarPoseSolver {
    params: SolverParams,
}

type Params6 = SVector<f64, 6>;
type Residual8 = SVector<f64, 8>;

fn pose_from(x: &Params6) -> Pose {
    Pose::new(
        Vector3::new(x[0], x[1], x[2]),
        Vector3::new(x[3], x[4], x[5]),
    )
}

fn params_from(pose: &Pose) -> Params6 {
    Params6::new(
        pose.rvec.x,
        pose.rvec.y,
        pose.rvec.z,
        pose.tvec.x,
        pose.tvec.y,
        pose.tvec.z,
    )
}

fn residuals(
    x: &Params6,
    object: &[Point3<f64>; 4],
    image: &[Point2<f64>; 4],
    camera: &CameraModel,
) -> Option<Residual8> {
    let pose = pose_from(x);
    let mut r = Residual8::zeros();
    for (i, (o, q)) in object.iter().zip(image).enumerate() {
        let p = camera.project(&pose.transform_point(o))?;
        r[2 * i] = p.x - q.x;
        r[2 * i + 1] = p.y - q.y;
    }
    Some(r)
}

fn numeric_jacobian(
    x: &Params6,
    object: &[Point3<f64>; 4],
    image: &[Point2<f64>; 4],
    camera: &CameraModel,
) -> Option<SMatrix<f64, 8, 6>> {
    let mut jac = SMatrix::<f64, 8, 6>::zeros();
    for j in 0..6 {
        let h = if j < 3 { 1e-6 } else { 1e-6 * x[j].abs().max(1.0) };
        let mut xp = *x;
        let mut xm = *x;
        xp[j] += h;
        xm[j] -= h;
        let rp = residuals(&xp, object, image, camera)?;
        let rm = residuals(&xm, object, image, camera)?;
        jac.set_column(j, &((rp - rm) / (2.0 * h)));
    }
    Some(jac)
}

/// Nearest rotation to `m` in the Frobenius sense.
fn project_to_so3(m: &Matrix3<f64>) -> Option<Rotation3<f64>> {
    let svd = m.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r = u_flipped * v_t;
    }
    Some(Rotation3::from_matrix_unchecked(r))
}

impl PlanarPoseSolver {
    pub fn new(params: SolverParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    #[inline]
    pub fn params(&self) -> &SolverParams {
        &self.params
    }

    /// Pose from the plane-to-normalized-image homography, `H ~ [r1 r2 t]`.
    pub fn initial_from_homography(
        object: &[Point3<f64>; 4],
        image: &[Point2<f64>; 4],
        camera: &CameraModel,
    ) -> Option<Pose> {
        if object.iter().any(|o| o.z.abs() > 1e-9) {
            return None;
        }
        let plane = object.map(|o| Point2::new(o.x, o.y));
        let mut normalized = [Point2::origin(); 4];
        for (n, q) in normalized.iter_mut().zip(image) {
            *n = camera.unproject(*q)?;
        }
        let h = homography_from_4pt(&plane, &normalized)?.h;

        let h1 = h.column(0).into_owned();
        let h2 = h.column(1).into_owned();
        let h3 = h.column(2).into_owned();
        let norm = 0.5 * (h1.norm() + h2.norm());
        if norm < 1e-12 {
            return None;
        }
        let mut s = 1.0 / norm;
        if h3.z * s < 0.0 {
            s = -s;
        }

        let r1 = h1 * s;
        let r2 = h2 * s;
        let r3 = r1.cross(&r2);
        let rotation = project_to_so3(&Matrix3::from_columns(&[r1, r2, r3]))?;
        let pose = Pose::from_rotation(&rotation, h3 * s);
        pose.is_finite().then_some(pose)
    }

    /// Levenberg-Marquardt on pixel reprojection error from `start`.
    pub fn refine(
        &self,
        object: &[Point3<f64>; 4],
        image: &[Point2<f64>; 4],
        camera: &CameraModel,
        start: &Pose,
    ) -> Option<Pose> {
        let mut x = params_from(start);
        let mut r = residuals(&x, object, image, camera)?;
        let mut cost = r.norm_squared();
        let mut lambda = self.params.initial_lambda;

        for _ in 0..self.params.max_iterations {
            if cost <= 1e-18 {
                break;
            }
            let jac = numeric_jacobian(&x, object, image, camera)?;
            let jtj = jac.transpose() * jac;
            let g = jac.transpose() * r;

            let mut improved = false;
            while lambda < 1e10 {
                let mut a = jtj;
                for k in 0..6 {
                    a[(k, k)] += lambda * (jtj[(k, k)] + 1e-12);
                }
                let Some(delta) = a.cholesky().map(|c| c.solve(&(-g))) else {
                    lambda *= 10.0;
                    continue;
                };
                let x_new = x + delta;
                match residuals(&x_new, object, image, camera) {
                    Some(r_new) if r_new.norm_squared() < cost => {
                        let new_cost = r_new.norm_squared();
                        let rel = (cost - new_cost) / cost.max(f64::MIN_POSITIVE);
                        x = x_new;
                        r = r_new;
                        cost = new_cost;
                        lambda = (lambda * 0.1).max(1e-12);
                        improved = rel > self.params.convergence_eps;
                        break;
                    }
                    _ => lambda *= 10.0,
                }
            }
            if !improved {
                break;
            }
        }

        let pose = pose_from(&x);
        pose.is_finite().then_some(pose)
    }
}

impl PoseSolver for PlanarPoseSolver {
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(warm = initial.is_some())))]
    fn solve(
        &self,
        object: &[Point3<f64>; 4],
        image: &[Point2<f64>; 4],
        camera: &CameraModel,
        initial: Option<&Pose>,
    ) -> Option<Pose> {
        let rmse = |p: &Pose| reprojection_rmse(object, image, camera, p);

        let warm = initial
            .filter(|p| p.is_finite())
            .and_then(|p| self.refine(object, image, camera, p))
            .and_then(|p| rmse(&p).map(|e| (p, e)));
        if let Some((pose, err)) = warm {
            if err <= self.params.reinit_rmse_px {
                return Some(pose);
            }
            log::debug!("warm start converged to rmse {err:.2}px, trying homography init");
        }

        let cold = Self::initial_from_homography(object, image, camera)
            .and_then(|p| self.refine(object, image, camera, &p))
            .and_then(|p| rmse(&p).map(|e| (p, e)));

        match (warm, cold) {
            (Some(w), Some(c)) => Some(if c.1 < w.1 { c.0 } else { w.0 }),
            (Some(w), None) => Some(w.0),
            (None, Some(c)) => Some(c.0),
            (None, None) => None,
        }
    }
}
