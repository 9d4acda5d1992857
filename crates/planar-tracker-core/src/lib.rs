//! Core types and utilities for planar marker tracking.
//!
//! This crate is intentionally small and purely geometric. It holds the
//! image views consumed by the detector, the corner/quad types exchanged
//! between pipeline stages, the camera model and the pose representation.
//! It does *not* depend on any concrete detector or pose solver.

mod camera;
mod error;
mod geometry;
mod homography;
mod image;
mod logger;
mod pose;

pub use camera::{CameraModel, Distortion};
pub use error::{ensure_non_negative, ensure_odd_kernel, ensure_positive, ensure_range, ConfigError};
pub use geometry::{CornerLabel, MarkerGeometry, OrderedCorners, Quad, Rect};
pub use homography::{homography_from_4pt, Homography};
pub use image::{
    luminance_crop, sample_bilinear, ColorImageView, GrayImage, GrayImageView, PixelLayout,
};
pub use pose::Pose;

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
