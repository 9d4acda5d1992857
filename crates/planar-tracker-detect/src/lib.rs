//! Quad detection and corner correspondence for planar marker tracking.
//!
//! [`QuadDetector`] turns one frame (or a search region of it) into at most
//! one convex quadrilateral: the silhouette of a bright sheet on a darker
//! background. [`order_corners`] labels its points TL, TR, BR, BL, either
//! from scratch or by following the previous frame's labels.
//!
//! ```
//! use planar_tracker_core::{GrayImage, Rect};
//! use planar_tracker_detect::{QuadDetector, QuadDetectorParams};
//!
//! let frame = GrayImage::filled(64, 48, 0);
//! let detector = QuadDetector::new(QuadDetectorParams::default()).unwrap();
//! assert!(detector.detect_gray(&frame.view(), Rect::full(64, 48)).is_none());
//! ```

mod contours;
mod correspondence;
mod detector;
mod filter;
mod params;
mod polygon;
mod threshold;

pub use correspondence::{
    order_by_tracking, order_corners, order_geometric, CorrespondenceError,
    CorrespondenceStrategy,
};
pub use detector::QuadDetector;
pub use params::{CorrespondenceParams, QuadDetectorParams, ThresholdMethod};
