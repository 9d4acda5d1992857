//! Rectangles, quads and the fixed corner convention.
//!
//! Corner convention used everywhere in the workspace: **TL, TR, BR, BL**
//! (clockwise on screen, image y axis pointing down). The same order is used
//! for [`OrderedCorners`] and for [`MarkerGeometry::object_points`]; a
//! mismatch would produce a mirrored or rotated pose instead of an error.

use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

use crate::{ensure_positive, ConfigError};

/// Float coordinates are clamped to this magnitude before conversion to
/// pixels, leaving headroom for padding arithmetic in `i32`.
const MAX_PIXEL_COORD: f32 = 1.0e6;

/// Axis-aligned integer rectangle in pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle covering a whole `width x height` frame.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    #[inline]
    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    /// Intersection with the frame `[0, w) x [0, h)`.
    pub fn clamp_to(&self, frame_w: usize, frame_h: usize) -> Rect {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = self.right().min(frame_w as i32);
        let y1 = self.bottom().min(frame_h as i32);
        Rect::new(
            x0,
            y0,
            x1.saturating_sub(x0).max(0),
            y1.saturating_sub(y0).max(0),
        )
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn contains_point(&self, p: Point2<f32>) -> bool {
        p.x >= self.x as f32
            && p.y >= self.y as f32
            && p.x <= self.right() as f32
            && p.y <= self.bottom() as f32
    }

    /// Smallest integer rectangle containing all `points` (floor/ceil).
    pub fn bounding(points: &[Point2<f32>]) -> Rect {
        if points.is_empty() {
            return Rect::default();
        }
        let mut min_x = f32::INFINITY;
        let mut min_y = f32::INFINITY;
        let mut max_x = f32::NEG_INFINITY;
        let mut max_y = f32::NEG_INFINITY;
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let to_px = |v: f32| v.clamp(-MAX_PIXEL_COORD, MAX_PIXEL_COORD) as i32;
        let x = to_px(min_x.floor());
        let y = to_px(min_y.floor());
        Rect::new(
            x,
            y,
            to_px(max_x.ceil()) - x,
            to_px(max_y.ceil()) - y,
        )
    }
}

/// Four detected corners, order unspecified.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub points: [Point2<f32>; 4],
}

impl Quad {
    pub fn new(points: [Point2<f32>; 4]) -> Self {
        Self { points }
    }

    pub fn centroid(&self) -> Point2<f32> {
        let (sx, sy) = self
            .points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        Point2::new(sx / 4.0, sy / 4.0)
    }

    /// The points sorted by angle around the centroid (clockwise on screen).
    pub fn cyclic(&self) -> [Point2<f32>; 4] {
        let c = self.centroid();
        let mut pts = self.points;
        pts.sort_by(|a, b| {
            let ta = (a.y - c.y).atan2(a.x - c.x);
            let tb = (b.y - c.y).atan2(b.x - c.x);
            ta.total_cmp(&tb)
        });
        pts
    }

    /// Polygon area of the cyclically ordered points.
    pub fn area(&self) -> f32 {
        polygon_area(&self.cyclic()).abs()
    }

    /// Convex, simple and non-degenerate, independent of input order.
    pub fn is_convex(&self) -> bool {
        let pts = self.cyclic();
        if pts.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return false;
        }
        let scale = pts
            .iter()
            .map(|p| (p - self.centroid()).norm())
            .fold(0.0f32, f32::max);
        if scale <= f32::EPSILON {
            return false;
        }
        let eps = 1e-6 * scale * scale;
        let mut sign = 0.0f32;
        for i in 0..4 {
            let a = pts[i];
            let b = pts[(i + 1) % 4];
            let c = pts[(i + 2) % 4];
            let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
            if cross.abs() <= eps {
                return false;
            }
            if sign == 0.0 {
                sign = cross.signum();
            } else if cross.signum() != sign {
                return false;
            }
        }
        true
    }

    pub fn bounding_box(&self) -> Rect {
        Rect::bounding(&self.points)
    }
}

/// Shoelace signed area; positive for clockwise-on-screen order.
pub(crate) fn polygon_area(pts: &[Point2<f32>]) -> f32 {
    let n = pts.len();
    let mut acc = 0.0f32;
    for i in 0..n {
        let a = pts[i];
        let b = pts[(i + 1) % n];
        acc += a.x * b.y - b.x * a.y;
    }
    0.5 * acc
}

/// Semantic corner slot inside [`OrderedCorners`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CornerLabel {
    TopLeft = 0,
    TopRight = 1,
    BottomRight = 2,
    BottomLeft = 3,
}

impl CornerLabel {
    pub const ALL: [CornerLabel; 4] = [
        CornerLabel::TopLeft,
        CornerLabel::TopRight,
        CornerLabel::BottomRight,
        CornerLabel::BottomLeft,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn short_name(self) -> &'static str {
        match self {
            CornerLabel::TopLeft => "TL",
            CornerLabel::TopRight => "TR",
            CornerLabel::BottomRight => "BR",
            CornerLabel::BottomLeft => "BL",
        }
    }
}

/// Corners in the fixed TL, TR, BR, BL order.
///
/// Index 0 is the same physical marker corner across consecutive accepted
/// frames; this is what corner correspondence guarantees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderedCorners {
    pub corners: [Point2<f32>; 4],
}

impl OrderedCorners {
    pub fn new(corners: [Point2<f32>; 4]) -> Self {
        Self { corners }
    }

    #[inline]
    pub fn get(&self, label: CornerLabel) -> Point2<f32> {
        self.corners[label.index()]
    }

    pub fn bounding_box(&self) -> Rect {
        Rect::bounding(&self.corners)
    }

    pub fn to_quad(&self) -> Quad {
        Quad::new(self.corners)
    }

    pub fn to_f64(&self) -> [Point2<f64>; 4] {
        self.corners.map(|p| Point2::new(p.x as f64, p.y as f64))
    }

    pub fn is_finite(&self) -> bool {
        self.corners
            .iter()
            .all(|p| p.x.is_finite() && p.y.is_finite())
    }
}

/// Physical size of the tracked sheet, in the caller's metric unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerGeometry {
    pub width: f64,
    pub height: f64,
}

impl Default for MarkerGeometry {
    /// A4 portrait in millimetres.
    fn default() -> Self {
        Self {
            width: 210.0,
            height: 297.0,
        }
    }
}

impl MarkerGeometry {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("marker.width", self.width)?;
        ensure_positive("marker.height", self.height)
    }

    /// Centered marker corners on the z = 0 plane, TL, TR, BR, BL.
    pub fn object_points(&self) -> [Point3<f64>; 4] {
        let hw = 0.5 * self.width;
        let hh = 0.5 * self.height;
        [
            Point3::new(-hw, -hh, 0.0),
            Point3::new(hw, -hh, 0.0),
            Point3::new(hw, hh, 0.0),
            Point3::new(-hw, hh, 0.0),
        ]
    }
}
