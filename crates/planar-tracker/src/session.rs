//! Per-stream tracking session: detection, labeling, pose, filtering.

use nalgebra::Point3;
use planar_tracker_core::{
    luminance_crop, CameraModel, ColorImageView, ConfigError, GrayImage, OrderedCorners, Pose,
    Quad, Rect,
};
use planar_tracker_detect::{order_corners, CorrespondenceStrategy, QuadDetector};
use planar_tracker_pose::{
    reprojection_rmse, FilterOutcome, PlanarPoseSolver, PoseSolver, RejectReason, TemporalFilter,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::flow::track_corners;
use crate::roi::AdaptiveRoi;
use crate::TrackerParams;

/// Outcome of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrackStatus {
    /// A fresh pose passed the filter.
    Accepted,
    /// Corners were found but their pose was not accepted.
    Rejected(RejectReason),
    /// Nothing found; the last accepted corners are held over.
    Persisted,
    /// Nothing found and nothing held.
    Lost,
}

/// Where the frame's corners came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerSource {
    Geometric,
    Tracking,
    Flow,
    Held,
    /// Passed in by the caller through [`MarkerTracker::process_corners`].
    Provided,
}

impl From<CorrespondenceStrategy> for CornerSource {
    fn from(s: CorrespondenceStrategy) -> Self {
        match s {
            CorrespondenceStrategy::Geometric => CornerSource::Geometric,
            CorrespondenceStrategy::Tracking => CornerSource::Tracking,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameResult {
    pub status: TrackStatus,
    /// Fresh pose when accepted, otherwise the last accepted one.
    pub pose: Option<Pose>,
    pub corners: Option<OrderedCorners>,
    #[serde(default)]
    pub source: Option<CornerSource>,
    /// Search window for the next frame.
    pub roi: Rect,
    /// Reprojection RMSE of the raw solver output, in pixels.
    #[serde(default)]
    pub rmse: Option<f64>,
}

impl FrameResult {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        self.status == TrackStatus::Accepted
    }
}

/// Tracks one marker through a stream of frames.
///
/// Holds all per-stream state; independent instances share nothing and can
/// live on different threads.
pub struct MarkerTracker {
    camera: CameraModel,
    params: TrackerParams,
    object: [Point3<f64>; 4],
    detector: QuadDetector,
    solver: Box<dyn PoseSolver>,
    filter: TemporalFilter,
    roi: Option<AdaptiveRoi>,
    /// Last accepted corners.
    held: Option<OrderedCorners>,
    misses: usize,
    /// Luminance of the frame `held` was found in, kept only with flow enabled.
    flow_anchor: Option<GrayImage>,
}

impl MarkerTracker {
    pub fn new(camera: CameraModel, params: TrackerParams) -> Result<Self, ConfigError> {
        camera.validate()?;
        params.validate()?;
        let detector = QuadDetector::new(params.detector.clone())?;
        let solver = PlanarPoseSolver::new(params.solver.clone())?;
        let filter = TemporalFilter::new(params.temporal.clone())?;
        Ok(Self {
            camera,
            object: params.marker.object_points(),
            params,
            detector,
            solver: Box::new(solver),
            filter,
            roi: None,
            held: None,
            misses: 0,
            flow_anchor: None,
        })
    }

    /// Replace the built-in pose solver.
    pub fn with_solver(mut self, solver: Box<dyn PoseSolver>) -> Self {
        self.solver = solver;
        self
    }

    #[inline]
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    #[inline]
    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    /// Search window state; `None` until the first frame.
    #[inline]
    pub fn roi(&self) -> Option<&AdaptiveRoi> {
        self.roi.as_ref()
    }

    /// Last accepted (smoothed) pose.
    #[inline]
    pub fn last_pose(&self) -> Option<&Pose> {
        self.filter.previous()
    }

    #[inline]
    pub fn held_corners(&self) -> Option<&OrderedCorners> {
        self.held.as_ref()
    }

    /// Forget everything learned from previous frames.
    pub fn reset(&mut self) {
        if let Some(roi) = self.roi.as_mut() {
            roi.reset();
        }
        self.filter.reset();
        self.held = None;
        self.misses = 0;
        self.flow_anchor = None;
    }

    /// Run the full pipeline on one frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(w = frame.width, h = frame.height))
    )]
    pub fn process_frame(&mut self, frame: &ColorImageView<'_>) -> FrameResult {
        let (w, h) = (frame.width, frame.height);
        self.sync_frame(w, h);
        let region = self.search_region(w, h);
        let quad = self.detector.detect(frame, region);

        if !self.params.flow.enabled {
            return self.process_quad(quad, w, h);
        }

        let luma = luminance_crop(frame, frame.full_rect());
        let result = match quad {
            Some(_) => self.process_quad(quad, w, h),
            None => match self.flow_corners(&luma) {
                Some(corners) => self.process_labeled(Some((corners, CornerSource::Flow)), w, h),
                None => self.process_quad(None, w, h),
            },
        };
        if result.is_accepted() {
            self.flow_anchor = Some(luma);
        }
        result
    }

    /// Continue from a detected quad (or a miss) in a `frame_w` x `frame_h` frame.
    pub fn process_quad(&mut self, quad: Option<Quad>, frame_w: usize, frame_h: usize) -> FrameResult {
        self.sync_frame(frame_w, frame_h);
        let labeled = quad.and_then(|q| {
            match order_corners(&q, self.held.as_ref(), &self.params.correspondence) {
                Ok((corners, strategy)) => Some((corners, CornerSource::from(strategy))),
                Err(err) => {
                    log::debug!("correspondence failed: {err}");
                    None
                }
            }
        });
        self.process_labeled(labeled, frame_w, frame_h)
    }

    /// Continue from corners the caller already labeled TL, TR, BR, BL.
    pub fn process_corners(
        &mut self,
        corners: Option<OrderedCorners>,
        frame_w: usize,
        frame_h: usize,
    ) -> FrameResult {
        self.process_labeled(corners.map(|c| (c, CornerSource::Provided)), frame_w, frame_h)
    }

    fn process_labeled(
        &mut self,
        labeled: Option<(OrderedCorners, CornerSource)>,
        frame_w: usize,
        frame_h: usize,
    ) -> FrameResult {
        self.sync_frame(frame_w, frame_h);
        let Some((corners, source)) = labeled.filter(|(c, _)| c.is_finite()) else {
            return self.miss();
        };

        if let Some(roi) = self.roi.as_mut() {
            roi.update_with_corners(&corners);
        }
        self.misses = 0;

        let image = corners.to_f64();
        let Some(candidate) =
            self.solver
                .solve(&self.object, &image, &self.camera, self.filter.previous())
        else {
            self.filter.record_rejection(RejectReason::SolverFailed);
            return self.rejected(RejectReason::SolverFailed, corners, source, None);
        };
        let rmse = reprojection_rmse(&self.object, &image, &self.camera, &candidate);

        match self
            .filter
            .validate_and_filter(&self.object, &image, &self.camera, &candidate)
        {
            FilterOutcome::Accepted(pose) => {
                self.held = Some(corners);
                FrameResult {
                    status: TrackStatus::Accepted,
                    pose: Some(pose),
                    corners: Some(corners),
                    source: Some(source),
                    roi: self.current_roi(),
                    rmse,
                }
            }
            FilterOutcome::Rejected(reason) => self.rejected(reason, corners, source, rmse),
        }
    }

    fn rejected(
        &self,
        reason: RejectReason,
        corners: OrderedCorners,
        source: CornerSource,
        rmse: Option<f64>,
    ) -> FrameResult {
        FrameResult {
            status: TrackStatus::Rejected(reason),
            pose: self.filter.previous().copied(),
            corners: Some(corners),
            source: Some(source),
            roi: self.current_roi(),
            rmse,
        }
    }

    /// A frame without usable corners.
    fn miss(&mut self) -> FrameResult {
        if let Some(roi) = self.roi.as_mut() {
            roi.mark_lost();
        }

        match self.held {
            Some(held) if self.misses < self.params.persistence_frames => {
                self.misses += 1;
                FrameResult {
                    status: TrackStatus::Persisted,
                    pose: self.filter.previous().copied(),
                    corners: Some(held),
                    source: Some(CornerSource::Held),
                    roi: self.current_roi(),
                    rmse: None,
                }
            }
            _ => {
                if self.held.take().is_some() {
                    log::debug!("marker lost after {} held frames", self.misses);
                }
                self.misses = 0;
                self.flow_anchor = None;
                self.filter.reset();
                FrameResult {
                    status: TrackStatus::Lost,
                    pose: None,
                    corners: None,
                    source: None,
                    roi: self.current_roi(),
                    rmse: None,
                }
            }
        }
    }

    fn flow_corners(&self, luma: &GrayImage) -> Option<OrderedCorners> {
        let held = self.held.as_ref()?;
        let anchor = self.flow_anchor.as_ref()?;
        let tracked = track_corners(&anchor.view(), &luma.view(), held, &self.params.flow);
        if tracked.is_some() {
            log::debug!("detection missed, corners recovered by optical flow");
        }
        tracked
    }

    /// Create the search window on the first frame (seeded from
    /// `initial_roi` when set); drop frame-bound state
    /// when the frame size changes.
    fn sync_frame(&mut self, frame_w: usize, frame_h: usize) {
        if frame_w == 0 || frame_h == 0 {
            return;
        }
        match self.roi.as_mut() {
            Some(roi) if roi.frame_size() == (frame_w, frame_h) => {}
            Some(roi) => {
                roi.resize(frame_w, frame_h);
                self.held = None;
                self.misses = 0;
                self.flow_anchor = None;
            }
            None => {
                let params = self.params.roi.clone();
                let created = match self.params.initial_roi {
                    Some(initial) => AdaptiveRoi::with_initial_box(frame_w, frame_h, params, initial),
                    None => AdaptiveRoi::new(frame_w, frame_h, params),
                };
                match created {
                    Ok(roi) => self.roi = Some(roi),
                    Err(err) => log::warn!("cannot create search window: {err}"),
                }
            }
        }
    }

    fn search_region(&self, frame_w: usize, frame_h: usize) -> Rect {
        self.roi
            .as_ref()
            .map_or_else(|| Rect::full(frame_w, frame_h), AdaptiveRoi::rect)
    }

    fn current_roi(&self) -> Rect {
        self.roi.as_ref().map(AdaptiveRoi::rect).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra::{Point2, Vector3};

    fn camera() -> CameraModel {
        CameraModel::new(600.0, 600.0, 320.0, 240.0).unwrap()
    }

    fn tracker() -> MarkerTracker {
        MarkerTracker::new(camera(), TrackerParams::default()).unwrap()
    }

    fn project(pose: &Pose) -> OrderedCorners {
        let cam = camera();
        let pts = TrackerParams::default()
            .marker
            .object_points()
            .map(|p| cam.project(&pose.transform_point(&p)).unwrap());
        OrderedCorners::new(pts.map(|p| Point2::new(p.x as f32, p.y as f32)))
    }

    fn frontal(z: f64) -> Pose {
        Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, z))
    }

    #[test]
    fn first_clean_corners_are_accepted() {
        let mut t = tracker();
        let r = t.process_corners(Some(project(&frontal(900.0))), 640, 480);
        assert_eq!(r.status, TrackStatus::Accepted);
        assert!(r.rmse.unwrap() < 0.1);
        let pose = r.pose.unwrap();
        assert_abs_diff_eq!(pose.tvec.z, 900.0, epsilon = 1.0);
        assert_eq!(r.source, Some(CornerSource::Provided));
        assert!(!t.roi().unwrap().is_full_frame());
    }

    #[test]
    fn misses_persist_then_lose() {
        let params = TrackerParams {
            persistence_frames: 2,
            ..TrackerParams::default()
        };
        let mut t = MarkerTracker::new(camera(), params).unwrap();
        let first = t.process_corners(Some(project(&frontal(900.0))), 640, 480);
        assert!(first.is_accepted());

        for _ in 0..2 {
            let r = t.process_corners(None, 640, 480);
            assert_eq!(r.status, TrackStatus::Persisted);
            assert_eq!(r.pose, first.pose);
            assert_eq!(r.corners, first.corners);
        }
        let lost = t.process_corners(None, 640, 480);
        assert_eq!(lost.status, TrackStatus::Lost);
        assert!(lost.pose.is_none());
        assert!(t.last_pose().is_none());
        assert!(t.held_corners().is_none());
    }

    #[test]
    fn rejected_frame_keeps_previous_pose_and_corners() {
        let mut t = tracker();
        let good = project(&frontal(900.0));
        let first = t.process_corners(Some(good), 640, 480);

        let mut bad = good;
        bad.corners[2].x += 50.0;
        let r = t.process_corners(Some(bad), 640, 480);
        assert!(matches!(r.status, TrackStatus::Rejected(_)));
        assert_eq!(r.pose, first.pose);
        assert_eq!(t.held_corners(), Some(&good));
    }

    #[test]
    fn rejected_frame_still_moves_search_window() {
        let mut t = tracker();
        t.process_corners(Some(project(&frontal(900.0))), 640, 480);
        let before = t.roi().unwrap().rect();

        // A far jump the filter refuses.
        let moved = Pose::new(Vector3::zeros(), Vector3::new(150.0, 0.0, 900.0));
        let r = t.process_corners(Some(project(&moved)), 640, 480);
        assert!(matches!(r.status, TrackStatus::Rejected(_)));
        assert_ne!(t.roi().unwrap().rect(), before);
    }

    #[test]
    fn frame_size_change_drops_held_corners() {
        let mut t = tracker();
        t.process_corners(Some(project(&frontal(900.0))), 640, 480);
        assert!(t.held_corners().is_some());
        t.process_corners(None, 1280, 720);
        assert!(t.held_corners().is_none());
        assert_eq!(t.roi().unwrap().frame_size(), (1280, 720));
    }

    #[test]
    fn reset_clears_session() {
        let mut t = tracker();
        t.process_corners(Some(project(&frontal(900.0))), 640, 480);
        t.reset();
        assert!(t.last_pose().is_none());
        assert!(t.held_corners().is_none());
        assert!(t.roi().unwrap().is_full_frame());
    }

    struct FailingSolver;

    impl PoseSolver for FailingSolver {
        fn solve(
            &self,
            _object: &[Point3<f64>; 4],
            _image: &[Point2<f64>; 4],
            _camera: &CameraModel,
            _initial: Option<&Pose>,
        ) -> Option<Pose> {
            None
        }
    }

    #[test]
    fn solver_failure_is_a_rejection() {
        let mut t = tracker().with_solver(Box::new(FailingSolver));
        let r = t.process_corners(Some(project(&frontal(900.0))), 640, 480);
        assert_eq!(r.status, TrackStatus::Rejected(RejectReason::SolverFailed));
        assert!(r.pose.is_none());
        assert!(r.rmse.is_none());
    }

    #[test]
    fn status_serializes_with_reason() {
        let json = serde_json::to_value(TrackStatus::Rejected(RejectReason::Reprojection {
            rmse: 4.5,
        }))
        .unwrap();
        assert_eq!(json["status"], "rejected");
        assert_eq!(json["reason"], "reprojection");
        assert_eq!(json["rmse"], 4.5);
    }
}
