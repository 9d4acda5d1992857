use nalgebra::{Point2, Point3};
use planar_tracker_core::{CameraModel, Pose};

/// Project marker-frame points through `pose` and `camera`.
///
/// `None` when any point lands behind the camera or the result is not
/// finite.
pub fn project_points(
    object: &[Point3<f64>],
    camera: &CameraModel,
    pose: &Pose,
) -> Option<Vec<Point2<f64>>> {
    object
        .iter()
        .map(|o| camera.project(&pose.transform_point(o)))
        .collect()
}

/// Root-mean-square pixel distance between `image` and the projection of
/// `object`.
pub fn reprojection_rmse(
    object: &[Point3<f64>],
    image: &[Point2<f64>],
    camera: &CameraModel,
    pose: &Pose,
) -> Option<f64> {
    if object.len() != image.len() || object.is_empty() || !pose.is_finite() {
        return None;
    }
    let projected = project_points(object, camera, pose)?;
    let sum_sq: f64 = projected
        .iter()
        .zip(image)
        .map(|(p, q)| (p - q).norm_squared())
        .sum();
    let rmse = (sum_sq / object.len() as f64).sqrt();
    rmse.is_finite().then_some(rmse)
}
