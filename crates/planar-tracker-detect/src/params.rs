use planar_tracker_core::{
    ensure_non_negative, ensure_odd_kernel, ensure_positive, ensure_range, ConfigError,
};
use serde::{Deserialize, Serialize};

/// How the binarization threshold is derived from the sample region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdMethod {
    /// Otsu's between-class variance maximum.
    #[default]
    Otsu,
    /// Mean of the sample minus a fixed offset.
    MeanOffset { offset: f32 },
}

/// Configuration for [`crate::QuadDetector`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadDetectorParams {
    /// Odd Gaussian kernel size; 1 disables blurring.
    pub blur_kernel: usize,
    pub threshold: ThresholdMethod,
    /// Side fraction of the central sample used for thresholding.
    pub sample_region_frac: f32,
    /// Otsu class means closer than this mean the central sample is
    /// unimodal; the whole search region is sampled instead.
    pub min_sample_contrast: f32,
    /// Frames whose threshold falls below this are rejected outright.
    pub safety_floor: u8,
    /// Odd kernel of the morphological close; 1 disables it.
    pub close_kernel: usize,
    /// Number of 3x3 dilations after the close.
    pub dilate_iterations: usize,
    /// Minimum polygon area as a fraction of the search region area.
    pub min_area_frac: f32,
    /// Approximate the convex hull of the contour instead of the raw contour.
    pub use_convex_hull: bool,
    /// Douglas-Peucker tolerance as a fraction of the perimeter.
    pub approx_epsilon_frac: f32,
    /// Second, coarser tolerance tried when the first does not give 4 vertices.
    pub approx_retry_epsilon_frac: f32,
}

impl Default for QuadDetectorParams {
    fn default() -> Self {
        Self {
            blur_kernel: 7,
            threshold: ThresholdMethod::Otsu,
            sample_region_frac: 0.5,
            min_sample_contrast: 24.0,
            safety_floor: 35,
            close_kernel: 5,
            dilate_iterations: 1,
            min_area_frac: 0.02,
            use_convex_hull: true,
            approx_epsilon_frac: 0.03,
            approx_retry_epsilon_frac: 0.05,
        }
    }
}

impl QuadDetectorParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_odd_kernel("detector.blur_kernel", self.blur_kernel)?;
        ensure_odd_kernel("detector.close_kernel", self.close_kernel)?;
        ensure_range(
            "detector.sample_region_frac",
            self.sample_region_frac as f64,
            0.05,
            1.0,
        )?;
        ensure_non_negative("detector.min_sample_contrast", self.min_sample_contrast as f64)?;
        ensure_range("detector.min_area_frac", self.min_area_frac as f64, 0.0, 1.0)?;
        ensure_positive("detector.approx_epsilon_frac", self.approx_epsilon_frac as f64)?;
        ensure_positive(
            "detector.approx_retry_epsilon_frac",
            self.approx_retry_epsilon_frac as f64,
        )?;
        if let ThresholdMethod::MeanOffset { offset } = self.threshold {
            ensure_range("detector.threshold.offset", offset as f64, -255.0, 255.0)?;
        }
        Ok(())
    }
}

/// Configuration for corner correspondence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrespondenceParams {
    /// A tracked corner moving farther than this falls back to geometric
    /// ordering.
    pub max_track_distance_px: f32,
}

impl Default for CorrespondenceParams {
    fn default() -> Self {
        Self {
            max_track_distance_px: 300.0,
        }
    }
}

impl CorrespondenceParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive(
            "correspondence.max_track_distance_px",
            self.max_track_distance_px as f64,
        )
    }
}
