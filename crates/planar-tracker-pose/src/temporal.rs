//! Gate and smooth per-frame pose candidates.

use std::fmt;

use nalgebra::{Point2, Point3};
use planar_tracker_core::{ensure_positive, ensure_range, CameraModel, ConfigError, Pose};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::reprojection::reprojection_rmse;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalParams {
    /// Maximum reprojection RMSE in pixels, applied to every candidate.
    pub max_rmse_px: f64,
    /// EMA weight of the new candidate, in `(0, 1]`.
    pub alpha: f64,
    /// Maximum translation change between accepted frames (marker units).
    pub max_delta_translation: f64,
    pub max_delta_rotation_deg: f64,
    /// Rejections in a row after which the stored pose is dropped; 0 never
    /// drops it.
    pub max_consecutive_rejections: usize,
}

impl Default for TemporalParams {
    fn default() -> Self {
        Self {
            max_rmse_px: 3.0,
            alpha: 0.7,
            max_delta_translation: 120.0,
            max_delta_rotation_deg: 20.0,
            max_consecutive_rejections: 15,
        }
    }
}

impl TemporalParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("temporal.max_rmse_px", self.max_rmse_px)?;
        ensure_positive("temporal.alpha", self.alpha)?;
        ensure_range("temporal.alpha", self.alpha, 0.0, 1.0)?;
        ensure_positive("temporal.max_delta_translation", self.max_delta_translation)?;
        ensure_range(
            "temporal.max_delta_rotation_deg",
            self.max_delta_rotation_deg,
            f64::MIN_POSITIVE,
            180.0,
        )
    }
}

/// Why a pose candidate was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    Reprojection { rmse: f64 },
    TranslationJump { delta: f64 },
    RotationJump { degrees: f64 },
    NonFinite,
    /// The pose solver returned nothing.
    SolverFailed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Reprojection { rmse } => write!(f, "reprojection rmse {rmse:.2}px"),
            RejectReason::TranslationJump { delta } => write!(f, "translation jump {delta:.1}"),
            RejectReason::RotationJump { degrees } => write!(f, "rotation jump {degrees:.1} deg"),
            RejectReason::NonFinite => f.write_str("non-finite pose or projection"),
            RejectReason::SolverFailed => f.write_str("pose solver failed"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FilterOutcome {
    Accepted(Pose),
    Rejected(RejectReason),
}

impl FilterOutcome {
    pub fn pose(&self) -> Option<&Pose> {
        match self {
            FilterOutcome::Accepted(p) => Some(p),
            FilterOutcome::Rejected(_) => None,
        }
    }
}

/// Reprojection and jump gating followed by exponential smoothing.
///
/// Rejected candidates never touch the stored pose.
#[derive(Clone, Debug)]
pub struct TemporalFilter {
    params: TemporalParams,
    previous: Option<Pose>,
    consecutive_rejections: usize,
}

impl TemporalFilter {
    pub fn new(params: TemporalParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            previous: None,
            consecutive_rejections: 0,
        })
    }

    #[inline]
    pub fn params(&self) -> &TemporalParams {
        &self.params
    }

    /// Last accepted (smoothed) pose.
    #[inline]
    pub fn previous(&self) -> Option<&Pose> {
        self.previous.as_ref()
    }

    #[inline]
    pub fn consecutive_rejections(&self) -> usize {
        self.consecutive_rejections
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.consecutive_rejections = 0;
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(bootstrap = self.previous.is_none()))
    )]
    pub fn validate_and_filter(
        &mut self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        camera: &CameraModel,
        candidate: &Pose,
    ) -> FilterOutcome {
        match self.evaluate(object, image, camera, candidate) {
            Ok(pose) => {
                self.previous = Some(pose);
                self.consecutive_rejections = 0;
                FilterOutcome::Accepted(pose)
            }
            Err(reason) => {
                self.record_rejection(reason);
                FilterOutcome::Rejected(reason)
            }
        }
    }

    /// Count a rejection decided outside the filter (e.g. a solver failure).
    pub fn record_rejection(&mut self, reason: RejectReason) {
        self.consecutive_rejections += 1;
        log::debug!(
            "pose rejected ({reason}), {} in a row",
            self.consecutive_rejections
        );
        let limit = self.params.max_consecutive_rejections;
        if limit > 0 && self.consecutive_rejections >= limit && self.previous.is_some() {
            log::info!("{limit} consecutive rejections, dropping stored pose");
            self.reset();
        }
    }

    fn evaluate(
        &self,
        object: &[Point3<f64>],
        image: &[Point2<f64>],
        camera: &CameraModel,
        candidate: &Pose,
    ) -> Result<Pose, RejectReason> {
        if !candidate.is_finite() {
            return Err(RejectReason::NonFinite);
        }
        let rmse =
            reprojection_rmse(object, image, camera, candidate).ok_or(RejectReason::NonFinite)?;
        if rmse > self.params.max_rmse_px {
            return Err(RejectReason::Reprojection { rmse });
        }

        let Some(prev) = self.previous else {
            log::debug!("bootstrap pose accepted, rmse {rmse:.2}px");
            return Ok(*candidate);
        };

        let delta = candidate.translation_delta(&prev);
        if delta > self.params.max_delta_translation {
            return Err(RejectReason::TranslationJump { delta });
        }
        let degrees = candidate.rotation_delta_deg(&prev);
        if degrees > self.params.max_delta_rotation_deg {
            return Err(RejectReason::RotationJump { degrees });
        }

        let smoothed = candidate.blend(&prev, self.params.alpha);
        if !smoothed.is_finite() {
            return Err(RejectReason::NonFinite);
        }
        Ok(smoothed)
    }
}
