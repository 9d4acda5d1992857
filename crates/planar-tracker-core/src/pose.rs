use nalgebra::{Matrix3, Matrix4, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Rigid transform from the marker frame to the camera frame.
///
/// `rvec` is an axis-angle vector (radians), `tvec` is in the marker's
/// metric unit. Camera convention is OpenCV: x right, y down, z forward.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl Pose {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    pub fn from_rotation(rotation: &Rotation3<f64>, tvec: Vector3<f64>) -> Self {
        Self {
            rvec: rotation.scaled_axis(),
            tvec,
        }
    }

    #[inline]
    pub fn rotation(&self) -> Rotation3<f64> {
        Rotation3::new(self.rvec)
    }

    #[inline]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        *self.rotation().matrix()
    }

    /// Marker-frame point expressed in the camera frame.
    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.rotation() * *p + self.tvec
    }

    pub fn is_finite(&self) -> bool {
        self.rvec.iter().chain(self.tvec.iter()).all(|v| v.is_finite())
    }

    /// Euclidean distance between the two translations.
    pub fn translation_delta(&self, other: &Pose) -> f64 {
        (self.tvec - other.tvec).norm()
    }

    /// Angle of the relative rotation `R_self * R_other^T`, in degrees.
    pub fn rotation_delta_deg(&self, other: &Pose) -> f64 {
        let rel = self.rotation_matrix() * other.rotation_matrix().transpose();
        let trace = rel.trace().clamp(-1.0, 3.0);
        let cos = ((trace - 1.0) * 0.5).clamp(-1.0, 1.0);
        cos.acos().to_degrees()
    }

    /// Component-wise `alpha * self + (1 - alpha) * previous`.
    ///
    /// Linear blending of axis-angle vectors is only meaningful for the small
    /// inter-frame deltas that survive the jump gates. Near a half turn the
    /// same rotation has two vectors pointing in opposite directions, so the
    /// candidate is first rewritten in the form closest to `previous`.
    pub fn blend(&self, previous: &Pose, alpha: f64) -> Pose {
        let beta = 1.0 - alpha;
        let rvec = nearest_equivalent(self.rvec, &previous.rvec) * alpha + previous.rvec * beta;
        Pose {
            rvec: wrap_rotation_vector(rvec),
            tvec: self.tvec * alpha + previous.tvec * beta,
        }
    }

    /// View matrix in OpenGL convention (y up, looking down -z).
    pub fn gl_view_matrix(&self) -> Matrix4<f64> {
        let mut view = Matrix4::identity();
        view.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&self.rotation_matrix());
        view.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.tvec);
        let cv_to_gl = Matrix4::from_diagonal(&nalgebra::Vector4::new(1.0, -1.0, -1.0, 1.0));
        cv_to_gl * view
    }
}

/// `rvec` or its `angle - 2π` twin, whichever lies closer to `reference`.
fn nearest_equivalent(rvec: Vector3<f64>, reference: &Vector3<f64>) -> Vector3<f64> {
    let angle = rvec.norm();
    if angle < f64::EPSILON {
        return rvec;
    }
    let twin = rvec * ((angle - TAU) / angle);
    if (twin - reference).norm_squared() < (rvec - reference).norm_squared() {
        twin
    } else {
        rvec
    }
}

/// Same rotation with the angle brought back into `[0, π]`.
fn wrap_rotation_vector(rvec: Vector3<f64>) -> Vector3<f64> {
    let angle = rvec.norm();
    if angle <= PI {
        return rvec;
    }
    rvec * ((angle - TAU) / angle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rotation_delta_matches_axis_angle() {
        let a = Pose::new(Vector3::zeros(), Vector3::zeros());
        let b = Pose::new(Vector3::new(0.0, 0.0, 15f64.to_radians()), Vector3::zeros());
        assert_relative_eq!(b.rotation_delta_deg(&a), 15.0, epsilon = 1e-9);
        assert_relative_eq!(a.rotation_delta_deg(&b), 15.0, epsilon = 1e-9);
        assert_relative_eq!(a.rotation_delta_deg(&a), 0.0, epsilon = 1e-6);
    }

    #[test]
    fn half_turn_delta_is_clamped_to_180() {
        let a = Pose::new(Vector3::zeros(), Vector3::zeros());
        let b = Pose::new(Vector3::new(0.0, 0.0, std::f64::consts::PI), Vector3::zeros());
        let d = b.rotation_delta_deg(&a);
        assert!(d.is_finite());
        assert_relative_eq!(d, 180.0, epsilon = 1e-6);
    }

    #[test]
    fn blend_weights_candidate_by_alpha() {
        let prev = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 1000.0));
        let cand = Pose::new(Vector3::new(0.1, 0.0, 0.0), Vector3::new(10.0, 0.0, 1000.0));
        let out = cand.blend(&prev, 0.7);
        assert_relative_eq!(out.tvec.x, 7.0, epsilon = 1e-12);
        assert_relative_eq!(out.rvec.x, 0.07, epsilon = 1e-12);
    }

    #[test]
    fn blend_across_half_turn_stays_between_inputs() {
        let rz = |deg: f64| {
            let rot = Rotation3::from_axis_angle(&Vector3::z_axis(), deg.to_radians());
            Pose::from_rotation(&rot, Vector3::new(0.0, 0.0, 900.0))
        };
        let prev = rz(178.0);
        let cand = rz(182.0);
        // scaled_axis keeps the angle in [0, π], so the two vectors point apart.
        assert!(cand.rvec.dot(&prev.rvec) < 0.0);
        assert_relative_eq!(cand.rotation_delta_deg(&prev), 4.0, epsilon = 1e-9);

        let out = cand.blend(&prev, 0.7);
        assert_relative_eq!(out.rotation_delta_deg(&prev), 2.8, epsilon = 1e-6);
        assert_relative_eq!(out.rotation_delta_deg(&cand), 1.2, epsilon = 1e-6);
        assert!(out.rvec.norm() <= PI + 1e-12);
    }

    #[test]
    fn gl_view_flips_y_and_z() {
        let pose = Pose::new(Vector3::zeros(), Vector3::new(1.0, 2.0, 500.0));
        let v = pose.gl_view_matrix();
        assert_relative_eq!(v[(0, 3)], 1.0);
        assert_relative_eq!(v[(1, 3)], -2.0);
        assert_relative_eq!(v[(2, 3)], -500.0);
        assert_relative_eq!(v[(1, 1)], -1.0);
        assert_relative_eq!(v[(3, 3)], 1.0);
    }
}
