//! Pose estimation and temporal filtering for planar marker tracking.
//!
//! - [`PoseSolver`] is the seam to any "4 correspondences + intrinsics"
//!   solver; [`PlanarPoseSolver`] is the built-in homography + LM one.
//! - [`TemporalFilter`] validates each candidate against reprojection error
//!   and inter-frame jump limits and exponentially smooths accepted poses.

mod reprojection;
mod solver;
mod temporal;

pub use reprojection::{project_points, reprojection_rmse};
pub use solver::{PlanarPoseSolver, PoseSolver, SolverParams};
pub use temporal::{FilterOutcome, RejectReason, TemporalFilter, TemporalParams};
