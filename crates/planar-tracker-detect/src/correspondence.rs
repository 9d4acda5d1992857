//! Stable TL/TR/BR/BL labeling of detected quad corners.
//!
//! Cold start uses image-axis extremes; once a labeled set exists, new points
//! inherit the label of the nearest previous corner. Tracking keeps index 0 on
//! the same physical corner through in-plane rotations where the geometric
//! rule would flip labels.

use std::cmp::Ordering;

use nalgebra::Point2;
use planar_tracker_core::{OrderedCorners, Quad};
use serde::{Deserialize, Serialize};

use crate::CorrespondenceParams;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrespondenceError {
    #[error("corner extremes do not select four distinct points")]
    Degenerate,
}

/// Which rule produced a labeling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrespondenceStrategy {
    Geometric,
    Tracking,
}

/// Lexicographic (x, y) order, used to make tie-breaks input independent.
fn lex(a: &Point2<f32>, b: &Point2<f32>) -> Ordering {
    a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y))
}

fn pick(points: &[Point2<f32>; 4], key: impl Fn(&Point2<f32>) -> f32, maximize: bool) -> Point2<f32> {
    let cmp = |a: &&Point2<f32>, b: &&Point2<f32>| key(a).total_cmp(&key(b)).then(lex(a, b));
    let best = if maximize {
        points.iter().max_by(cmp)
    } else {
        points.iter().min_by(cmp)
    };
    // a 4-element array always has an extreme
    best.copied().unwrap_or(points[0])
}

/// Cold-start labeling from image-axis extremes.
///
/// TL minimizes `x + y`, BR maximizes it; TR minimizes `y - x`, BL
/// maximizes it. Fails when the four picks are not distinct points.
pub fn order_geometric(quad: &Quad) -> Result<OrderedCorners, CorrespondenceError> {
    let pts = &quad.points;
    if pts.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
        return Err(CorrespondenceError::Degenerate);
    }
    let tl = pick(pts, |p| p.x + p.y, false);
    let br = pick(pts, |p| p.x + p.y, true);
    let tr = pick(pts, |p| p.y - p.x, false);
    let bl = pick(pts, |p| p.y - p.x, true);

    let out = [tl, tr, br, bl];
    for i in 0..4 {
        for j in i + 1..4 {
            if out[i] == out[j] {
                return Err(CorrespondenceError::Degenerate);
            }
        }
    }
    Ok(OrderedCorners::new(out))
}

/// Greedy nearest-neighbour labeling against `previous`.
///
/// Previous corners claim, in index order, the closest unclaimed new
/// point. `None` when any claim is farther than `max_distance`.
pub fn order_by_tracking(
    quad: &Quad,
    previous: &OrderedCorners,
    max_distance: f32,
) -> Option<OrderedCorners> {
    let mut claimed = [false; 4];
    let mut out = [Point2::origin(); 4];
    for (i, prev) in previous.corners.iter().enumerate() {
        let (j, d) = quad
            .points
            .iter()
            .enumerate()
            .filter(|(j, _)| !claimed[*j])
            .map(|(j, p)| (j, (p - prev).norm()))
            .min_by(|a, b| a.1.total_cmp(&b.1))?;
        if !(d <= max_distance) {
            return None;
        }
        claimed[j] = true;
        out[i] = quad.points[j];
    }
    Some(OrderedCorners::new(out))
}

/// Label `quad`, tracking from `previous` when given and falling back to
/// the geometric rule.
pub fn order_corners(
    quad: &Quad,
    previous: Option<&OrderedCorners>,
    params: &CorrespondenceParams,
) -> Result<(OrderedCorners, CorrespondenceStrategy), CorrespondenceError> {
    if let Some(prev) = previous {
        if let Some(tracked) = order_by_tracking(quad, prev, params.max_track_distance_px) {
            return Ok((tracked, CorrespondenceStrategy::Tracking));
        }
        log::debug!("corner tracking failed, falling back to geometric ordering");
    }
    order_geometric(quad).map(|c| (c, CorrespondenceStrategy::Geometric))
}
