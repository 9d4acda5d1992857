//! Binarization threshold selection.

use planar_tracker_core::GrayImage;

use crate::{QuadDetectorParams, ThresholdMethod};

pub(crate) struct Histogram {
    bins: [u32; 256],
    total: u64,
}

impl Histogram {
    fn from_window(img: &GrayImage, x0: usize, y0: usize, w: usize, h: usize) -> Self {
        let mut bins = [0u32; 256];
        for y in y0..y0 + h {
            let row = &img.data[y * img.width + x0..y * img.width + x0 + w];
            for &v in row {
                bins[v as usize] += 1;
            }
        }
        Self {
            bins,
            total: (w * h) as u64,
        }
    }

    fn mean(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        let sum: u64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(i, &h)| i as u64 * h as u64)
            .sum();
        (sum as f64 / self.total as f64) as f32
    }

    /// Mean of the classes `[0, t]` and `(t, 255]`.
    fn class_means(&self, t: u8) -> (f32, f32) {
        let (mut n_lo, mut s_lo, mut n_hi, mut s_hi) = (0u64, 0u64, 0u64, 0u64);
        for (i, &h) in self.bins.iter().enumerate() {
            if i <= t as usize {
                n_lo += h as u64;
                s_lo += i as u64 * h as u64;
            } else {
                n_hi += h as u64;
                s_hi += i as u64 * h as u64;
            }
        }
        let m = |s: u64, n: u64| if n == 0 { t as f32 } else { s as f32 / n as f32 };
        (m(s_lo, n_lo), m(s_hi, n_hi))
    }
}

/// Otsu threshold; pixels `> t` are foreground.
///
/// Ties in the between-class variance (an empty gap between two modes) are
/// resolved to the middle of the plateau rather than its lower edge.
pub(crate) fn otsu_threshold(hist: &Histogram) -> u8 {
    if hist.total == 0 {
        return 127;
    }
    let min_v = hist.bins.iter().position(|&h| h > 0).unwrap_or(0);
    let max_v = hist.bins.iter().rposition(|&h| h > 0).unwrap_or(255);
    if min_v == max_v {
        return min_v as u8;
    }

    let total = hist.total as f64;
    let sum_total: f64 = hist
        .bins
        .iter()
        .enumerate()
        .map(|(i, &h)| i as f64 * h as f64)
        .sum();

    let mut sum_b = 0f64;
    let mut w_b = 0f64;
    let mut best_var = -1f64;
    let mut best_lo = 127usize;
    let mut best_hi = 127usize;

    for (t, &h) in hist.bins.iter().enumerate() {
        w_b += h as f64;
        if w_b < 1.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f < 1.0 {
            break;
        }

        sum_b += t as f64 * h as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_total - sum_b) / w_f;

        let var_between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if var_between > best_var * (1.0 + 1e-12) {
            best_var = var_between;
            best_lo = t;
            best_hi = t;
        } else if (var_between - best_var).abs() <= best_var * 1e-12 && best_hi + 1 == t {
            best_hi = t;
        }
    }

    ((best_lo + best_hi) / 2) as u8
}

fn central_window(w: usize, h: usize, frac: f32) -> (usize, usize, usize, usize) {
    let sw = ((w as f32 * frac).round() as usize).clamp(1, w);
    let sh = ((h as f32 * frac).round() as usize).clamp(1, h);
    ((w - sw) / 2, (h - sh) / 2, sw, sh)
}

/// Threshold for a (blurred) search region, or `None` when the region has no
/// usable contrast.
pub(crate) fn compute_threshold(img: &GrayImage, params: &QuadDetectorParams) -> Option<u8> {
    if img.width == 0 || img.height == 0 {
        return None;
    }
    let (x0, y0, sw, sh) = central_window(img.width, img.height, params.sample_region_frac);
    let sample = Histogram::from_window(img, x0, y0, sw, sh);

    match params.threshold {
        ThresholdMethod::MeanOffset { offset } => {
            let t = (sample.mean() - offset).clamp(0.0, 255.0);
            Some(t as u8)
        }
        ThresholdMethod::Otsu => {
            let t = otsu_threshold(&sample);
            let (lo, hi) = sample.class_means(t);
            if hi - lo >= params.min_sample_contrast {
                return Some(t);
            }
            let full = Histogram::from_window(img, 0, 0, img.width, img.height);
            let t = otsu_threshold(&full);
            let (lo, hi) = full.class_means(t);
            log::trace!(
                "central sample unimodal, widened: t={t} means=({lo:.1}, {hi:.1})"
            );
            (hi - lo >= params.min_sample_contrast).then_some(t)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_with(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> GrayImage {
        let mut img = GrayImage::new(width, height);
        for y in 0..height {
            for x in 0..width {
                img.set(x, y, f(x, y));
            }
        }
        img
    }

    #[test]
    fn otsu_splits_two_modes_in_the_middle() {
        let img = image_with(20, 10, |x, _| if x < 10 { 40 } else { 220 });
        let hist = Histogram::from_window(&img, 0, 0, 20, 10);
        let t = otsu_threshold(&hist);
        assert!(t >= 40 && t < 220);
        assert!((t as i32 - 130).abs() <= 1, "t = {t}");
    }

    #[test]
    fn unimodal_center_widens_to_full_region() {
        // sheet fills the middle, background only at the border
        let img = image_with(40, 40, |x, y| {
            if (6..34).contains(&x) && (6..34).contains(&y) {
                220
            } else {
                40
            }
        });
        let t = compute_threshold(&img, &QuadDetectorParams::default()).expect("threshold");
        assert!(t > 40 && t < 220);
    }

    #[test]
    fn flat_region_has_no_threshold() {
        let img = GrayImage::filled(32, 32, 128);
        assert_eq!(compute_threshold(&img, &QuadDetectorParams::default()), None);
    }

    #[test]
    fn mean_offset_is_clamped() {
        let img = GrayImage::filled(8, 8, 10);
        let params = QuadDetectorParams {
            threshold: ThresholdMethod::MeanOffset { offset: 15.0 },
            ..QuadDetectorParams::default()
        };
        assert_eq!(compute_threshold(&img, &params), Some(0));
    }
}
