use crate::flow::FlowParams;
use crate::roi::RoiParams;
use planar_tracker_core::{ConfigError, MarkerGeometry, Rect};
use planar_tracker_detect::{CorrespondenceParams, QuadDetectorParams};
use planar_tracker_pose::{SolverParams, TemporalParams};
use serde::{Deserialize, Serialize};

/// Every tunable of a tracking session.
///
/// Deserializes from partial JSON: missing sections and fields take their
/// defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    pub marker: MarkerGeometry,
    pub detector: QuadDetectorParams,
    pub correspondence: CorrespondenceParams,
    pub roi: RoiParams,
    pub solver: SolverParams,
    pub temporal: TemporalParams,
    pub flow: FlowParams,
    /// Frames for which the last accepted corners stand in for a missed
    /// detection before the marker is declared lost.
    pub persistence_frames: usize,
    /// Search box for the first frame; `None` searches the whole frame.
    pub initial_roi: Option<Rect>,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            marker: MarkerGeometry::default(),
            detector: QuadDetectorParams::default(),
            correspondence: CorrespondenceParams::default(),
            roi: RoiParams::default(),
            solver: SolverParams::default(),
            temporal: TemporalParams::default(),
            flow: FlowParams::default(),
            persistence_frames: 5,
            initial_roi: None,
        }
    }
}

impl TrackerParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.marker.validate()?;
        self.detector.validate()?;
        self.correspondence.validate()?;
        self.roi.validate()?;
        self.solver.validate()?;
        self.temporal.validate()?;
        self.flow.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{
            "marker": { "width": 216.0, "height": 279.0 },
            "temporal": { "alpha": 0.5 },
            "flow": { "enabled": true },
            "persistence_frames": 2
        }"#;
        let params: TrackerParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.marker.width, 216.0);
        assert_eq!(params.temporal.alpha, 0.5);
        assert_eq!(params.temporal.max_rmse_px, 3.0);
        assert!(params.flow.enabled);
        assert_eq!(params.flow.window_radius, 10);
        assert_eq!(params.roi, RoiParams::default());
        assert_eq!(params.persistence_frames, 2);
        assert_eq!(params.initial_roi, None);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn initial_roi_is_read_from_json() {
        let json = r#"{ "initial_roi": { "x": 10, "y": 20, "width": 300, "height": 200 } }"#;
        let params: TrackerParams = serde_json::from_str(json).unwrap();
        assert_eq!(params.initial_roi, Some(Rect::new(10, 20, 300, 200)));
    }

    #[test]
    fn nested_errors_surface() {
        let mut params = TrackerParams::default();
        params.roi.min_width = 0;
        assert!(matches!(
            params.validate(),
            Err(ConfigError::NotPositive { name: "roi.min_width", .. })
        ));
    }
}
