//! Real-time tracking of a planar sheet marker with a calibrated camera.
//!
//! This crate provides:
//! - re-exports of the underlying crates (`core`, `quad`, `pose`)
//! - [`MarkerTracker`], a per-stream session that runs detection, corner
//!   labeling, pose estimation and temporal filtering on every frame
//! - JSON configuration and report helpers
//! - (feature `image`) adapters from `image` buffers
//!
//! ## Quickstart
//!
//! ```no_run
//! use planar_tracker::{detect, MarkerTracker, TrackStatus, TrackerParams};
//! use planar_tracker::core::CameraModel;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let camera = CameraModel::new(600.0, 600.0, 320.0, 240.0)?;
//! let mut tracker = MarkerTracker::new(camera, TrackerParams::default())?;
//! let frame = image::open("frame.png")?.to_rgb8();
//! let result = detect::process_rgb_image(&mut tracker, &frame);
//! if result.status == TrackStatus::Accepted {
//!     println!("pose: {:?}", result.pose);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `planar_tracker::core`: images, geometry, camera model, pose.
//! - `planar_tracker::quad`: quad detector and corner correspondence.
//! - `planar_tracker::pose`: pose solver trait and temporal filter.
//! - `planar_tracker::detect` (feature `image`): helpers for `image` buffers.

pub use planar_tracker_core as core;
pub use planar_tracker_detect as quad;
pub use planar_tracker_pose as pose;

mod flow;
mod io;
mod params;
mod roi;
mod session;

pub use flow::{track_corners, FlowParams};
pub use io::{FrameRecord, TrackReport, TrackSummary, TrackerConfig, TrackerIoError};
pub use params::TrackerParams;
pub use roi::{AdaptiveRoi, RoiParams};
pub use session::{CornerSource, FrameResult, MarkerTracker, TrackStatus};

pub use planar_tracker_core::{CameraModel, ConfigError, MarkerGeometry, OrderedCorners, Pose};
pub use planar_tracker_pose::{PoseSolver, RejectReason};

#[cfg(feature = "image")]
pub mod detect;

