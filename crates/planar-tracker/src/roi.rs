//! Adaptive search window that follows the marker between frames.

use planar_tracker_core::{ensure_non_negative, ensure_positive, ConfigError, OrderedCorners, Rect};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiParams {
    /// Margin added on every side of the corner bounding box, in pixels.
    pub pad_px: i32,
    pub min_width: i32,
    pub min_height: i32,
    /// Consecutive misses after which the window falls back to the full frame.
    pub lost_reset: usize,
}

impl Default for RoiParams {
    fn default() -> Self {
        Self {
            pad_px: 40,
            min_width: 160,
            min_height: 120,
            lost_reset: 8,
        }
    }
}

impl RoiParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure_non_negative("roi.pad_px", self.pad_px as f64)?;
        ensure_positive("roi.min_width", self.min_width as f64)?;
        ensure_positive("roi.min_height", self.min_height as f64)?;
        ensure_positive("roi.lost_reset", self.lost_reset as f64)?;
        Ok(())
    }
}

/// Search rectangle for the quad detector.
///
/// Two states: full frame, or a padded window around the last corners.
/// The window survives `lost_reset - 1` misses and snaps back to the full
/// frame on the next one.
#[derive(Clone, Debug)]
pub struct AdaptiveRoi {
    params: RoiParams,
    frame_w: usize,
    frame_h: usize,
    rect: Rect,
    lost: usize,
}

impl AdaptiveRoi {
    pub fn new(frame_w: usize, frame_h: usize, params: RoiParams) -> Result<Self, ConfigError> {
        params.validate()?;
        ensure_positive("frame width", frame_w as f64)?;
        ensure_positive("frame height", frame_h as f64)?;
        Ok(Self {
            params,
            frame_w,
            frame_h,
            rect: Rect::full(frame_w, frame_h),
            lost: 0,
        })
    }

    /// Start tracking from a known box; an empty or off-frame box means full frame.
    pub fn with_initial_box(
        frame_w: usize,
        frame_h: usize,
        params: RoiParams,
        initial: Rect,
    ) -> Result<Self, ConfigError> {
        let mut roi = Self::new(frame_w, frame_h, params)?;
        let clamped = initial.clamp_to(frame_w, frame_h);
        if !clamped.is_empty() {
            roi.rect = clamped;
        }
        Ok(roi)
    }

    #[inline]
    pub fn params(&self) -> &RoiParams {
        &self.params
    }

    #[inline]
    pub fn rect(&self) -> Rect {
        self.rect
    }

    #[inline]
    pub fn lost_count(&self) -> usize {
        self.lost
    }

    #[inline]
    pub fn frame_size(&self) -> (usize, usize) {
        (self.frame_w, self.frame_h)
    }

    pub fn is_full_frame(&self) -> bool {
        self.rect == Rect::full(self.frame_w, self.frame_h)
    }

    pub fn reset(&mut self) {
        self.rect = Rect::full(self.frame_w, self.frame_h);
        self.lost = 0;
    }

    /// Adopt a new frame size. Zero sizes are ignored.
    pub fn resize(&mut self, frame_w: usize, frame_h: usize) {
        if frame_w == 0 || frame_h == 0 || (frame_w, frame_h) == (self.frame_w, self.frame_h) {
            return;
        }
        log::warn!(
            "frame size changed from {}x{} to {frame_w}x{frame_h}, search window reset",
            self.frame_w,
            self.frame_h
        );
        self.frame_w = frame_w;
        self.frame_h = frame_h;
        self.reset();
    }

    /// Center the window on the given corners.
    pub fn update_with_corners(&mut self, corners: &OrderedCorners) {
        if !corners.is_finite() {
            log::debug!("non-finite corners, treating frame as a miss");
            self.mark_lost();
            return;
        }
        let bbox = corners.bounding_box();
        let pad = self.params.pad_px;
        let padded = Rect::new(
            bbox.x.saturating_sub(pad),
            bbox.y.saturating_sub(pad),
            bbox.width.saturating_add(pad.saturating_mul(2)),
            bbox.height.saturating_add(pad.saturating_mul(2)),
        )
        .clamp_to(self.frame_w, self.frame_h);

        let (x, width) = widen(
            padded.x,
            padded.width,
            self.params.min_width,
            self.frame_w as i32,
        );
        let (y, height) = widen(
            padded.y,
            padded.height,
            self.params.min_height,
            self.frame_h as i32,
        );
        self.rect = Rect::new(x, y, width, height);
        self.lost = 0;
    }

    /// Count one frame without corners.
    pub fn mark_lost(&mut self) {
        self.lost += 1;
        if self.lost >= self.params.lost_reset {
            log::debug!("marker lost for {} frames, searching full frame", self.lost);
            self.reset();
        }
    }
}

/// Grow `[start, start + len)` to at least `min_len` around its center,
/// then shift it back inside `[0, limit)`.
fn widen(start: i32, len: i32, min_len: i32, limit: i32) -> (i32, i32) {
    if len >= min_len {
        return (start, len);
    }
    let grown = min_len.min(limit);
    let center = start + len / 2;
    let shifted = (center - grown / 2).clamp(0, limit - grown);
    (shifted, grown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn corners(pts: [(f32, f32); 4]) -> OrderedCorners {
        OrderedCorners::new(pts.map(|(x, y)| Point2::new(x, y)))
    }

    fn roi() -> AdaptiveRoi {
        AdaptiveRoi::new(640, 480, RoiParams::default()).unwrap()
    }

    #[test]
    fn starts_full_frame() {
        let r = roi();
        assert!(r.is_full_frame());
        assert_eq!(r.rect(), Rect::new(0, 0, 640, 480));
        assert_eq!(r.lost_count(), 0);
    }

    #[test]
    fn window_contains_padded_box() {
        let mut r = roi();
        let c = corners([(200.3, 150.2), (420.0, 160.0), (410.5, 330.9), (210.0, 320.0)]);
        r.update_with_corners(&c);
        let bbox = c.bounding_box();
        let padded = Rect::new(bbox.x - 40, bbox.y - 40, bbox.width + 80, bbox.height + 80);
        assert!(r.rect().contains_rect(&padded));
        assert!(!r.is_full_frame());
        assert_eq!(r.lost_count(), 0);
    }

    #[test]
    fn padding_is_clamped_at_frame_edges() {
        let mut r = roi();
        r.update_with_corners(&corners([(5.0, 5.0), (300.0, 10.0), (300.0, 200.0), (8.0, 190.0)]));
        let rect = r.rect();
        assert_eq!((rect.x, rect.y), (0, 0));
        assert!(rect.right() <= 640 && rect.bottom() <= 480);
        assert!(rect.contains_point(Point2::new(300.0, 200.0)));
    }

    #[test]
    fn far_off_frame_corners_keep_window_inside_frame() {
        let mut r = roi();
        let (lo, hi) = (-3.0e9, 3.0e9);
        r.update_with_corners(&corners([(lo, lo), (hi, lo), (hi, hi), (lo, hi)]));
        assert!(r.is_full_frame());

        // Finite but far to the right of the frame.
        r.update_with_corners(&corners([(4.0e9, 10.0), (4.1e9, 10.0), (4.1e9, 50.0), (4.0e9, 50.0)]));
        let rect = r.rect();
        assert_eq!((rect.width, rect.height), (160, 120));
        assert!(Rect::full(640, 480).contains_rect(&rect));
        assert_eq!(r.lost_count(), 0);
    }

    #[test]
    fn small_box_is_widened_to_minimum_size() {
        let mut r = roi();
        // 20x10 px box, 100x90 after padding.
        let c = corners([(300.0, 200.0), (320.0, 200.0), (320.0, 210.0), (300.0, 210.0)]);
        r.update_with_corners(&c);
        let rect = r.rect();
        assert_eq!(rect.width, 160);
        assert_eq!(rect.height, 120);
        assert!(rect.contains_rect(&Rect::new(260, 160, 100, 90)));
    }

    #[test]
    fn widened_window_is_shifted_inside_frame() {
        let mut r = roi();
        let c = corners([(630.0, 470.0), (638.0, 470.0), (638.0, 478.0), (630.0, 478.0)]);
        r.update_with_corners(&c);
        let rect = r.rect();
        assert_eq!(rect, Rect::new(480, 360, 160, 120));
    }

    #[test]
    fn minimum_larger_than_frame_is_capped() {
        let mut r = AdaptiveRoi::new(100, 80, RoiParams::default()).unwrap();
        r.update_with_corners(&corners([(40.0, 30.0), (50.0, 30.0), (50.0, 40.0), (40.0, 40.0)]));
        assert!(r.is_full_frame());
    }

    #[test]
    fn rect_survives_until_lost_reset() {
        let mut r = roi();
        r.update_with_corners(&corners([(200.0, 150.0), (420.0, 160.0), (410.0, 330.0), (210.0, 320.0)]));
        let tracked = r.rect();
        for _ in 0..7 {
            r.mark_lost();
        }
        assert_eq!(r.rect(), tracked);
        assert_eq!(r.lost_count(), 7);

        r.mark_lost();
        assert!(r.is_full_frame());
        assert_eq!(r.lost_count(), 0);
    }

    #[test]
    fn update_clears_lost_count() {
        let mut r = roi();
        r.mark_lost();
        r.mark_lost();
        r.update_with_corners(&corners([(200.0, 150.0), (420.0, 160.0), (410.0, 330.0), (210.0, 320.0)]));
        assert_eq!(r.lost_count(), 0);
    }

    #[test]
    fn non_finite_corners_count_as_miss() {
        let mut r = roi();
        r.update_with_corners(&corners([(f32::NAN, 1.0), (2.0, 1.0), (2.0, 2.0), (1.0, 2.0)]));
        assert_eq!(r.lost_count(), 1);
        assert!(r.is_full_frame());
    }

    #[test]
    fn initial_box_is_clamped() {
        let r = AdaptiveRoi::with_initial_box(640, 480, RoiParams::default(), Rect::new(600, 400, 100, 100))
            .unwrap();
        assert_eq!(r.rect(), Rect::new(600, 400, 40, 80));

        let empty = AdaptiveRoi::with_initial_box(640, 480, RoiParams::default(), Rect::new(700, 0, 10, 10))
            .unwrap();
        assert!(empty.is_full_frame());
    }

    #[test]
    fn resize_resets_to_new_full_frame() {
        let mut r = roi();
        r.update_with_corners(&corners([(200.0, 150.0), (420.0, 160.0), (410.0, 330.0), (210.0, 320.0)]));
        r.resize(1280, 720);
        assert_eq!(r.frame_size(), (1280, 720));
        assert_eq!(r.rect(), Rect::new(0, 0, 1280, 720));
    }

    #[test]
    fn invalid_params_are_rejected() {
        let bad = RoiParams {
            lost_reset: 0,
            ..RoiParams::default()
        };
        assert!(AdaptiveRoi::new(640, 480, bad).is_err());
        let bad = RoiParams {
            pad_px: -1,
            ..RoiParams::default()
        };
        assert!(AdaptiveRoi::new(640, 480, bad).is_err());
        assert!(AdaptiveRoi::new(0, 480, RoiParams::default()).is_err());
    }
}
