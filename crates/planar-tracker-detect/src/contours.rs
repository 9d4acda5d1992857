//! External contours of a binary mask.
//!
//! Foreground is split into 8-connected components; the outer boundary of
//! each large-enough component is traced with Moore-neighbour following.
//! Holes are never reported.

use nalgebra::Point2;
use planar_tracker_core::GrayImage;

/// Clockwise-on-screen neighbour offsets, starting east.
const DIRS: [(i32, i32); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

#[derive(Clone, Debug)]
pub(crate) struct Contour {
    /// Boundary pixel centres in tracing order.
    pub points: Vec<Point2<i32>>,
    /// Shoelace area enclosed by `points`.
    pub area: f64,
}

fn dir_index(dx: i32, dy: i32) -> Option<usize> {
    DIRS.iter().position(|&d| d == (dx, dy))
}

struct Mask<'a> {
    img: &'a GrayImage,
}

impl Mask<'_> {
    #[inline]
    fn fg(&self, x: i32, y: i32) -> bool {
        x >= 0
            && y >= 0
            && (x as usize) < self.img.width
            && (y as usize) < self.img.height
            && self.img.data[y as usize * self.img.width + x as usize] != 0
    }
}

/// Moore-neighbour step: first foreground neighbour of `cur`, scanning
/// clockwise from the backtrack direction. Returns the neighbour and the
/// new backtrack direction as seen from it.
fn next_boundary(mask: &Mask<'_>, cur: Point2<i32>, back: usize) -> Option<(Point2<i32>, usize)> {
    for i in 1..=8 {
        let d = (back + i) % 8;
        let (dx, dy) = DIRS[d];
        let n = Point2::new(cur.x + dx, cur.y + dy);
        if mask.fg(n.x, n.y) {
            let (px, py) = DIRS[(d + 7) % 8];
            let prev = Point2::new(cur.x + px, cur.y + py);
            let nb = dir_index(prev.x - n.x, prev.y - n.y)?;
            return Some((n, nb));
        }
    }
    None
}

fn trace_boundary(mask: &Mask<'_>, start: Point2<i32>, max_steps: usize) -> Vec<Point2<i32>> {
    let mut points = vec![start];
    let Some(first) = next_boundary(mask, start, WEST) else {
        return points;
    };

    let (mut cur, mut back) = first;
    for _ in 0..max_steps {
        if cur == start {
            match next_boundary(mask, cur, back) {
                Some((n, _)) if n == first.0 => break,
                _ => {}
            }
        }
        points.push(cur);
        match next_boundary(mask, cur, back) {
            Some((n, b)) => {
                cur = n;
                back = b;
            }
            None => break,
        }
    }
    points
}

fn shoelace(points: &[Point2<i32>]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        acc += a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64;
    }
    (acc as f64 * 0.5).abs()
}

/// Outer contours of components whose bounding box covers at least
/// `min_bbox_area` pixels.
pub(crate) fn external_contours(img: &GrayImage, min_bbox_area: usize) -> Vec<Contour> {
    let (w, h) = (img.width, img.height);
    let mask = Mask { img };
    let mut visited = vec![false; w * h];
    let mut stack = Vec::new();
    let mut out = Vec::new();

    for y0 in 0..h {
        for x0 in 0..w {
            let idx0 = y0 * w + x0;
            if visited[idx0] || img.data[idx0] == 0 {
                continue;
            }

            // flood fill, tracking bbox and pixel count
            let (mut min_x, mut min_y, mut max_x, mut max_y) = (x0, y0, x0, y0);
            let mut count = 0usize;
            visited[idx0] = true;
            stack.push((x0, y0));
            while let Some((x, y)) = stack.pop() {
                count += 1;
                min_x = min_x.min(x);
                max_x = max_x.max(x);
                min_y = min_y.min(y);
                max_y = max_y.max(y);
                for &(dx, dy) in &DIRS {
                    let nx = x as i32 + dx;
                    let ny = y as i32 + dy;
                    if !mask.fg(nx, ny) {
                        continue;
                    }
                    let ni = ny as usize * w + nx as usize;
                    if !visited[ni] {
                        visited[ni] = true;
                        stack.push((nx as usize, ny as usize));
                    }
                }
            }

            let bbox_area = (max_x - min_x + 1) * (max_y - min_y + 1);
            if bbox_area < min_bbox_area {
                continue;
            }

            // (x0, y0) is the first raster pixel: its west and north
            // neighbours are background.
            let start = Point2::new(x0 as i32, y0 as i32);
            let points = trace_boundary(&mask, start, 4 * count + 16);
            let area = shoelace(&points);
            out.push(Contour { points, area });
        }
    }
    out
}
