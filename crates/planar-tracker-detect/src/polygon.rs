//! Convex hull and closed-polygon simplification.

use nalgebra::Point2;

#[inline]
fn cross(o: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Monotone-chain convex hull without collinear points.
pub(crate) fn convex_hull(points: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut pts = points.to_vec();
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    let mut hull: Vec<Point2<f64>> = Vec::with_capacity(2 * pts.len());
    for &p in &pts {
        while hull.len() >= 2 && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0 {
            hull.pop();
        }
        hull.push(p);
    }
    let lower_len = hull.len() + 1;
    for &p in pts.iter().rev().skip(1) {
        while hull.len() >= lower_len
            && cross(hull[hull.len() - 2], hull[hull.len() - 1], p) <= 0.0
        {
            hull.pop();
        }
        hull.push(p);
    }
    hull.pop();
    hull
}

pub(crate) fn closed_perimeter(points: &[Point2<f64>]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n)
        .map(|i| (points[(i + 1) % n] - points[i]).norm())
        .sum()
}

fn segment_distance(p: Point2<f64>, a: Point2<f64>, b: Point2<f64>) -> f64 {
    let ab = b - a;
    let len2 = ab.norm_squared();
    if len2 <= f64::EPSILON {
        return (p - a).norm();
    }
    let t = ((p - a).dot(&ab) / len2).clamp(0.0, 1.0);
    (p - (a + ab * t)).norm()
}

/// Douglas-Peucker on the open chain `pts`; returns kept indices, first and
/// last always included.
fn simplify_chain(pts: &[Point2<f64>], epsilon: f64) -> Vec<usize> {
    let n = pts.len();
    if n <= 2 {
        return (0..n).collect();
    }
    let mut keep = vec![false; n];
    keep[0] = true;
    keep[n - 1] = true;
    let mut stack = vec![(0usize, n - 1)];
    while let Some((s, e)) = stack.pop() {
        if e <= s + 1 {
            continue;
        }
        let (mut best, mut best_d) = (s, -1.0f64);
        for i in s + 1..e {
            let d = segment_distance(pts[i], pts[s], pts[e]);
            if d > best_d {
                best = i;
                best_d = d;
            }
        }
        if best_d > epsilon {
            keep[best] = true;
            stack.push((s, best));
            stack.push((best, e));
        }
    }
    (0..n).filter(|&i| keep[i]).collect()
}

fn farthest_from(points: &[Point2<f64>], from: Point2<f64>) -> usize {
    let mut best = 0;
    let mut best_d = -1.0;
    for (i, p) in points.iter().enumerate() {
        let d = (p - from).norm_squared();
        if d > best_d {
            best = i;
            best_d = d;
        }
    }
    best
}

/// Douglas-Peucker on a closed polygon.
///
/// The polygon is split at two mutually distant vertices (a point far from
/// vertex 0, and the point farthest from that), so the anchors are
/// extremal and survive simplification anyway.
pub(crate) fn approx_closed_polygon(points: &[Point2<f64>], epsilon: f64) -> Vec<Point2<f64>> {
    let n = points.len();
    if n <= 3 {
        return points.to_vec();
    }
    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    if a == b {
        return vec![points[a]];
    }

    let chain = |from: usize, to: usize| -> Vec<Point2<f64>> {
        let len = (to + n - from) % n;
        (0..=len).map(|k| points[(from + k) % n]).collect()
    };

    let mut out = Vec::new();
    for (from, to) in [(a, b), (b, a)] {
        let c = chain(from, to);
        let kept = simplify_chain(&c, epsilon);
        // drop the last index; it starts the other chain
        out.extend(kept[..kept.len() - 1].iter().map(|&i| c[i]));
    }
    out
}
