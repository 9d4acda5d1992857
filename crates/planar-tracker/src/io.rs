//! JSON configuration and report helpers.

use crate::{FrameResult, MarkerTracker, TrackStatus, TrackerParams};
use planar_tracker_core::{CameraModel, ConfigError};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

#[derive(thiserror::Error, Debug)]
pub enum TrackerIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Camera intrinsics plus tracker parameters, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerConfig {
    pub camera: CameraModel,
    #[serde(default)]
    pub tracker: TrackerParams,
}

impl TrackerConfig {
    pub fn new(camera: CameraModel, tracker: TrackerParams) -> Self {
        Self { camera, tracker }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TrackerIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TrackerIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Validate and build a tracker.
    pub fn build_tracker(&self) -> Result<MarkerTracker, TrackerIoError> {
        Ok(MarkerTracker::new(self.camera, self.tracker.clone())?)
    }
}

/// One processed frame in a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub index: usize,
    #[serde(default)]
    pub name: Option<String>,
    pub result: FrameResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackSummary {
    pub frames: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub persisted: usize,
    pub lost: usize,
}

/// Per-frame results of a tracking run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackReport {
    #[serde(default)]
    pub config: Option<TrackerConfig>,
    pub frames: Vec<FrameRecord>,
}

impl TrackReport {
    pub fn new(config: Option<TrackerConfig>) -> Self {
        Self {
            config,
            frames: Vec::new(),
        }
    }

    pub fn push(&mut self, name: Option<String>, result: FrameResult) {
        let index = self.frames.len();
        self.frames.push(FrameRecord {
            index,
            name,
            result,
        });
    }

    pub fn summary(&self) -> TrackSummary {
        let mut s = TrackSummary {
            frames: self.frames.len(),
            ..TrackSummary::default()
        };
        for f in &self.frames {
            match f.result.status {
                TrackStatus::Accepted => s.accepted += 1,
                TrackStatus::Rejected(_) => s.rejected += 1,
                TrackStatus::Persisted => s.persisted += 1,
                TrackStatus::Lost => s.lost += 1,
            }
        }
        s
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TrackerIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), TrackerIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use planar_tracker_core::{OrderedCorners, Pose, Rect};
    use planar_tracker_pose::RejectReason;
    use nalgebra::{Point2, Vector3};

    fn config() -> TrackerConfig {
        let mut tracker = TrackerParams::default();
        tracker.temporal.alpha = 0.5;
        tracker.flow.enabled = true;
        TrackerConfig::new(CameraModel::new(600.0, 610.0, 320.0, 240.0).unwrap(), tracker)
    }

    #[test]
    fn config_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tracker.json");
        let cfg = config();
        cfg.write_json(&path).unwrap();
        let loaded = TrackerConfig::load_json(&path).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn camera_only_config_uses_default_params() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("camera.json");
        fs::write(
            &path,
            r#"{ "camera": { "fx": 800.0, "fy": 800.0, "cx": 640.0, "cy": 360.0 } }"#,
        )
        .unwrap();
        let cfg = TrackerConfig::load_json(&path).unwrap();
        assert_eq!(cfg.tracker, TrackerParams::default());
        assert!(cfg.camera.distortion.is_zero());
        assert!(cfg.build_tracker().is_ok());
    }

    #[test]
    fn invalid_config_fails_to_build() {
        let mut cfg = config();
        cfg.tracker.temporal.alpha = 1.5;
        assert!(matches!(cfg.build_tracker(), Err(TrackerIoError::Config(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrackerConfig::load_json(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, TrackerIoError::Io(_)));
    }

    #[test]
    fn report_counts_statuses_and_round_trips() {
        let pose = Pose::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 900.0));
        let corners = OrderedCorners::new([
            Point2::new(250.0, 141.0),
            Point2::new(390.0, 141.0),
            Point2::new(390.0, 339.0),
            Point2::new(250.0, 339.0),
        ]);
        let accepted = FrameResult {
            status: TrackStatus::Accepted,
            pose: Some(pose),
            corners: Some(corners),
            source: None,
            roi: Rect::new(200, 90, 240, 300),
            rmse: Some(0.2),
        };
        let rejected = FrameResult {
            status: TrackStatus::Rejected(RejectReason::RotationJump { degrees: 35.0 }),
            rmse: Some(1.0),
            ..accepted
        };
        let lost = FrameResult {
            status: TrackStatus::Lost,
            pose: None,
            corners: None,
            source: None,
            roi: Rect::new(0, 0, 640, 480),
            rmse: None,
        };

        let mut report = TrackReport::new(Some(config()));
        report.push(Some("f0.png".into()), accepted);
        report.push(None, rejected);
        report.push(None, lost);

        let s = report.summary();
        assert_eq!((s.frames, s.accepted, s.rejected, s.persisted, s.lost), (3, 1, 1, 0, 1));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();
        let loaded = TrackReport::load_json(&path).unwrap();
        assert_eq!(loaded.frames.len(), 3);
        assert_eq!(loaded.frames[1].result.status, rejected.status);
        assert_eq!(loaded.frames[2].index, 2);
        assert_eq!(loaded.frames[0].name.as_deref(), Some("f0.png"));
    }
}
