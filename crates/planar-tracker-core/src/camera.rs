//! Pinhole intrinsics with OpenCV-compatible rational distortion.

use nalgebra::{Matrix3, Matrix4, Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::{ensure_positive, ConfigError};

/// Distortion coefficients `k1 k2 p1 p2 [k3 [k4 k5 k6]]`.
///
/// Unused trailing coefficients are zero, so the 4- and 5-coefficient
/// variants are special cases of the rational model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
    pub k4: f64,
    pub k5: f64,
    pub k6: f64,
}

impl Distortion {
    /// Build from an OpenCV-style coefficient list of length 0, 4, 5 or 8.
    pub fn from_coeffs(coeffs: &[f64]) -> Result<Self, ConfigError> {
        if !matches!(coeffs.len(), 0 | 4 | 5 | 8) {
            return Err(ConfigError::DistortionLength(coeffs.len()));
        }
        if coeffs.iter().any(|c| !c.is_finite()) {
            return Err(ConfigError::InvalidIntrinsics(
                "distortion coefficients must be finite",
            ));
        }
        let at = |i: usize| coeffs.get(i).copied().unwrap_or(0.0);
        Ok(Self {
            k1: at(0),
            k2: at(1),
            p1: at(2),
            p2: at(3),
            k3: at(4),
            k4: at(5),
            k5: at(6),
            k6: at(7),
        })
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    fn radial(&self, r2: f64) -> Option<f64> {
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let num = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let den = 1.0 + self.k4 * r2 + self.k5 * r4 + self.k6 * r6;
        if den.abs() < 1e-12 {
            return None;
        }
        let radial = num / den;
        radial.is_finite().then_some(radial)
    }

    fn tangential(&self, x: f64, y: f64, r2: f64) -> (f64, f64) {
        (
            2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x),
            self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y,
        )
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, p: Point2<f64>) -> Option<Point2<f64>> {
        let r2 = p.x * p.x + p.y * p.y;
        let radial = self.radial(r2)?;
        let (dx, dy) = self.tangential(p.x, p.y, r2);
        let out = Point2::new(p.x * radial + dx, p.y * radial + dy);
        (out.x.is_finite() && out.y.is_finite()).then_some(out)
    }

    /// Fixed-point inversion of [`Distortion::distort`].
    pub fn undistort(&self, pd: Point2<f64>) -> Option<Point2<f64>> {
        if self.is_zero() {
            return Some(pd);
        }
        const MAX_ITERS: usize = 20;
        const EPS: f64 = 1e-12;

        let (mut x, mut y) = (pd.x, pd.y);
        for _ in 0..MAX_ITERS {
            let r2 = x * x + y * y;
            let radial = self.radial(r2)?;
            if radial.abs() < 1e-12 {
                return None;
            }
            let (dx, dy) = self.tangential(x, y, r2);
            let x_next = (pd.x - dx) / radial;
            let y_next = (pd.y - dy) / radial;
            if !x_next.is_finite() || !y_next.is_finite() {
                return None;
            }
            let step = (x_next - x).hypot(y_next - y);
            x = x_next;
            y = y_next;
            if step <= EPS {
                break;
            }
        }
        Some(Point2::new(x, y))
    }
}

/// Skew-free pinhole camera plus distortion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    #[serde(default)]
    pub distortion: Distortion,
}

impl CameraModel {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, ConfigError> {
        let cam = Self {
            fx,
            fy,
            cx,
            cy,
            distortion: Distortion::default(),
        };
        cam.validate()?;
        Ok(cam)
    }

    /// Build from a 3x3 intrinsic matrix and an OpenCV coefficient list.
    pub fn from_matrix(k: Matrix3<f64>, dist: &[f64]) -> Result<Self, ConfigError> {
        if k[(1, 0)] != 0.0 || k[(2, 0)] != 0.0 || k[(2, 1)] != 0.0 {
            return Err(ConfigError::InvalidIntrinsics("matrix must be upper triangular"));
        }
        if k[(0, 1)].abs() > 1e-9 {
            return Err(ConfigError::InvalidIntrinsics("skew is not supported"));
        }
        if (k[(2, 2)] - 1.0).abs() > 1e-9 {
            return Err(ConfigError::InvalidIntrinsics("k33 must be 1"));
        }
        let cam = Self {
            fx: k[(0, 0)],
            fy: k[(1, 1)],
            cx: k[(0, 2)],
            cy: k[(1, 2)],
            distortion: Distortion::from_coeffs(dist)?,
        };
        cam.validate()?;
        Ok(cam)
    }

    pub fn with_distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = distortion;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("camera.fx", self.fx)?;
        ensure_positive("camera.fy", self.fy)?;
        if !self.cx.is_finite() || !self.cy.is_finite() {
            return Err(ConfigError::InvalidIntrinsics("principal point must be finite"));
        }
        Ok(())
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// Project a camera-frame point to distorted pixels; `None` behind the camera.
    pub fn project(&self, p: &Point3<f64>) -> Option<Point2<f64>> {
        if !(p.z > 1e-9) {
            return None;
        }
        let n = Point2::new(p.x / p.z, p.y / p.z);
        let d = self.distortion.distort(n)?;
        Some(Point2::new(self.fx * d.x + self.cx, self.fy * d.y + self.cy))
    }

    /// Pixel to undistorted normalized coordinates.
    pub fn unproject(&self, pixel: Point2<f64>) -> Option<Point2<f64>> {
        let pd = Point2::new((pixel.x - self.cx) / self.fx, (pixel.y - self.cy) / self.fy);
        self.distortion.undistort(pd)
    }

    /// OpenGL projection matrix matching these intrinsics for a `w x h` viewport.
    ///
    /// `None` unless the viewport is non-empty and `0 < near < far`.
    pub fn gl_projection(
        &self,
        width: f64,
        height: f64,
        near: f64,
        far: f64,
    ) -> Option<Matrix4<f64>> {
        let usable = width > 0.0 && height > 0.0 && near > 0.0 && far > near;
        if !usable || !far.is_finite() || !width.is_finite() || !height.is_finite() {
            return None;
        }
        let mut p = Matrix4::zeros();
        p[(0, 0)] = 2.0 * self.fx / width;
        p[(1, 1)] = 2.0 * self.fy / height;
        p[(0, 2)] = 1.0 - 2.0 * self.cx / width;
        p[(1, 2)] = 2.0 * self.cy / height - 1.0;
        p[(2, 2)] = -(far + near) / (far - near);
        p[(2, 3)] = -2.0 * far * near / (far - near);
        p[(3, 2)] = -1.0;
        Some(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    fn distorted_camera() -> CameraModel {
        CameraModel::from_matrix(
            Matrix3::new(900.0, 0.0, 640.0, 0.0, 920.0, 360.0, 0.0, 0.0, 1.0),
            &[-0.12, 0.03, 0.001, -0.0008, 0.004],
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_coefficient_count() {
        let k = Matrix3::new(600.0, 0.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
        assert_eq!(
            CameraModel::from_matrix(k, &[0.1, 0.2, 0.3]),
            Err(ConfigError::DistortionLength(3))
        );
        assert!(CameraModel::from_matrix(k, &[]).is_ok());
        assert!(CameraModel::from_matrix(k, &[0.0; 8]).is_ok());
    }

    #[test]
    fn rejects_zero_focal_and_skew() {
        assert!(CameraModel::new(0.0, 600.0, 320.0, 240.0).is_err());
        let skewed = Matrix3::new(600.0, 3.0, 320.0, 0.0, 600.0, 240.0, 0.0, 0.0, 1.0);
        assert!(CameraModel::from_matrix(skewed, &[]).is_err());
    }

    #[test]
    fn project_then_unproject_recovers_ray() {
        let cam = distorted_camera();
        let p = Point3::new(120.0, -80.0, 900.0);
        let px = cam.project(&p).unwrap();
        let n = cam.unproject(px).unwrap();
        assert_relative_eq!(n.x, p.x / p.z, epsilon = 1e-9);
        assert_relative_eq!(n.y, p.y / p.z, epsilon = 1e-9);
    }

    #[test]
    fn points_behind_camera_do_not_project() {
        let cam = CameraModel::new(600.0, 600.0, 320.0, 240.0).unwrap();
        assert!(cam.project(&Point3::new(0.0, 0.0, -1.0)).is_none());
        assert!(cam.project(&Point3::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn gl_projection_maps_principal_ray_to_center() {
        let cam = CameraModel::new(600.0, 600.0, 320.0, 240.0).unwrap();
        let p = cam.gl_projection(640.0, 480.0, 0.1, 1000.0).unwrap();
        // principal ray in GL eye space looks down -z
        let clip = p * Vector4::new(0.0, 0.0, -10.0, 1.0);
        assert_relative_eq!(clip.x / clip.w, 0.0, epsilon = 1e-12);
        assert_relative_eq!(clip.y / clip.w, 0.0, epsilon = 1e-12);
        assert!(clip.z / clip.w > -1.0 && clip.z / clip.w < 1.0);
    }

    #[test]
    fn gl_projection_rejects_degenerate_frustum() {
        let cam = CameraModel::new(600.0, 600.0, 320.0, 240.0).unwrap();
        assert!(cam.gl_projection(640.0, 480.0, 10.0, 10.0).is_none());
        assert!(cam.gl_projection(640.0, 480.0, 100.0, 10.0).is_none());
        assert!(cam.gl_projection(640.0, 480.0, 0.0, 1000.0).is_none());
        assert!(cam.gl_projection(0.0, 480.0, 0.1, 1000.0).is_none());
        assert!(cam.gl_projection(640.0, f64::NAN, 0.1, 1000.0).is_none());
        assert!(cam.gl_projection(640.0, 480.0, 0.1, f64::INFINITY).is_none());
    }
}
