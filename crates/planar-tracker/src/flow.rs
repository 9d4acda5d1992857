//! Pyramidal Lucas-Kanade tracking of the four marker corners.
//!
//! Used when the detector misses a frame but the previous corners and the
//! previous luminance frame are known. Each corner is tracked independently,
//! coarse to fine; the result is only usable when all four converge inside
//! the frame.

use nalgebra::{Matrix2, Point2, Vector2};
use planar_tracker_core::{
    ensure_positive, ConfigError, GrayImage, GrayImageView, OrderedCorners, sample_bilinear,
};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Smallest pyramid level side, in pixels.
const MIN_LEVEL_SIDE: usize = 16;
/// Minimum eigenvalue of the per-pixel structure tensor; below it the
/// window has no usable texture.
const MIN_EIGENVALUE: f32 = 1e-2;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    pub enabled: bool,
    /// Half-size of the tracking window; the window is `2r + 1` pixels wide.
    pub window_radius: usize,
    /// Pyramid levels including full resolution.
    pub levels: usize,
    /// Gauss-Newton iterations per level.
    pub max_iterations: usize,
    /// Stop once an update is shorter than this, in pixels.
    pub epsilon: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            enabled: false,
            window_radius: 10,
            levels: 3,
            max_iterations: 30,
            epsilon: 0.01,
        }
    }
}

impl FlowParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_positive("flow.window_radius", self.window_radius as f64)?;
        ensure_positive("flow.levels", self.levels as f64)?;
        ensure_positive("flow.max_iterations", self.max_iterations as f64)?;
        ensure_positive("flow.epsilon", self.epsilon as f64)?;
        Ok(())
    }
}

/// Gaussian pyramid, `levels[0]` at full resolution.
struct Pyramid {
    levels: Vec<GrayImage>,
}

impl Pyramid {
    fn build(src: &GrayImageView<'_>, max_levels: usize) -> Self {
        let mut levels = vec![GrayImage {
            width: src.width,
            height: src.height,
            data: src.data.to_vec(),
        }];
        while levels.len() < max_levels {
            let Some(last) = levels.last() else { break };
            if last.width / 2 < MIN_LEVEL_SIDE || last.height / 2 < MIN_LEVEL_SIDE {
                break;
            }
            let next = pyr_down(last);
            levels.push(next);
        }
        Self { levels }
    }
}

/// 5-tap binomial blur followed by 2x decimation.
fn pyr_down(src: &GrayImage) -> GrayImage {
    const TAPS: [u32; 5] = [1, 4, 6, 4, 1];
    let (w, h) = (src.width, src.height);
    let at = |x: isize, y: isize| -> u32 {
        let xc = x.clamp(0, w as isize - 1) as usize;
        let yc = y.clamp(0, h as isize - 1) as usize;
        src.data[yc * w + xc] as u32
    };

    let (dw, dh) = (w / 2, h / 2);
    let mut out = GrayImage::new(dw, dh);
    for dy in 0..dh {
        for dx in 0..dw {
            let (cx, cy) = ((2 * dx) as isize, (2 * dy) as isize);
            let mut acc = 0u32;
            for (j, wy) in TAPS.iter().enumerate() {
                for (i, wx) in TAPS.iter().enumerate() {
                    acc += wx * wy * at(cx + i as isize - 2, cy + j as isize - 2);
                }
            }
            out.data[dy * dw + dx] = ((acc + 128) / 256) as u8;
        }
    }
    out
}

/// Track one point from `prev` to `next`; returns its new position.
fn track_point(
    prev: &Pyramid,
    next: &Pyramid,
    point: Point2<f32>,
    params: &FlowParams,
) -> Option<Point2<f32>> {
    let levels = prev.levels.len().min(next.levels.len());
    let r = params.window_radius as i32;
    let mut guess = Vector2::<f32>::zeros();

    for level in (0..levels).rev() {
        let scale = (1u32 << level) as f32;
        let template = prev.levels[level].view();
        let target = next.levels[level].view();
        let p = Point2::new(point.x / scale, point.y / scale);

        // Template values and gradients are fixed for the whole level.
        let mut samples = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        let mut g = Matrix2::<f32>::zeros();
        for j in -r..=r {
            for i in -r..=r {
                let (x, y) = (p.x + i as f32, p.y + j as f32);
                let value = sample_bilinear(&template, x, y);
                let ix = 0.5 * (sample_bilinear(&template, x + 1.0, y) - sample_bilinear(&template, x - 1.0, y));
                let iy = 0.5 * (sample_bilinear(&template, x, y + 1.0) - sample_bilinear(&template, x, y - 1.0));
                g[(0, 0)] += ix * ix;
                g[(0, 1)] += ix * iy;
                g[(1, 1)] += iy * iy;
                samples.push((i as f32, j as f32, value, ix, iy));
            }
        }
        g[(1, 0)] = g[(0, 1)];

        let n = samples.len() as f32;
        let trace = g[(0, 0)] + g[(1, 1)];
        let det = g[(0, 0)] * g[(1, 1)] - g[(0, 1)] * g[(0, 1)];
        let min_eig = 0.5 * (trace - (trace * trace - 4.0 * det).max(0.0).sqrt());
        if min_eig / n < MIN_EIGENVALUE {
            log::trace!("flow: textureless window at level {level}");
            return None;
        }
        let g_inv = g.try_inverse()?;

        let mut d = Vector2::<f32>::zeros();
        for _ in 0..params.max_iterations {
            let mut b = Vector2::<f32>::zeros();
            for &(i, j, value, ix, iy) in &samples {
                let x = p.x + i + guess.x + d.x;
                let y = p.y + j + guess.y + d.y;
                let err = value - sample_bilinear(&target, x, y);
                b.x += err * ix;
                b.y += err * iy;
            }
            let delta = g_inv * b;
            if !delta.x.is_finite() || !delta.y.is_finite() {
                return None;
            }
            d += delta;
            if delta.norm() < params.epsilon {
                break;
            }
        }

        guess += d;
        if level > 0 {
            guess *= 2.0;
        }
    }

    let out = Point2::new(point.x + guess.x, point.y + guess.y);
    (out.x.is_finite() && out.y.is_finite()).then_some(out)
}

/// Track the labeled corners from `prev` into `next`.
///
/// Labels are carried over unchanged. Returns `None` unless every corner
/// converges to a point inside `next`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(width = next.width, height = next.height))
)]
pub fn track_corners(
    prev: &GrayImageView<'_>,
    next: &GrayImageView<'_>,
    corners: &OrderedCorners,
    params: &FlowParams,
) -> Option<OrderedCorners> {
    if (prev.width, prev.height) != (next.width, next.height) || next.width == 0 || next.height == 0 {
        return None;
    }
    let prev_pyr = Pyramid::build(prev, params.levels);
    let next_pyr = Pyramid::build(next, params.levels);

    let (w, h) = (next.width as f32, next.height as f32);
    let mut out = corners.corners;
    for (slot, &pt) in out.iter_mut().zip(corners.corners.iter()) {
        let tracked = track_point(&prev_pyr, &next_pyr, pt, params)?;
        if tracked.x < 0.0 || tracked.y < 0.0 || tracked.x > w - 1.0 || tracked.y > h - 1.0 {
            log::debug!("flow: corner left the frame at ({:.1}, {:.1})", tracked.x, tracked.y);
            return None;
        }
        *slot = tracked;
    }
    Some(OrderedCorners::new(out))
}
