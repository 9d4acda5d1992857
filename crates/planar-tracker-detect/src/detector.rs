use nalgebra::Point2;
use planar_tracker_core::{
    luminance_crop, ColorImageView, ConfigError, GrayImage, GrayImageView, Quad, Rect,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::contours::external_contours;
use crate::filter::{binarize, close, dilate, gaussian_blur};
use crate::polygon::{approx_closed_polygon, closed_perimeter, convex_hull};
use crate::threshold::compute_threshold;
use crate::QuadDetectorParams;

/// Regions smaller than this on either side are not searched.
const MIN_REGION_SIDE: i32 = 8;

/// Single-sheet quadrilateral detector.
///
/// Finds the largest bright convex quadrilateral in a search region:
/// blur, threshold, morphology, external contours, hull and polygon
/// approximation. At most one quad is returned per call.
#[derive(Clone, Debug)]
pub struct QuadDetector {
    params: QuadDetectorParams,
}

impl QuadDetector {
    pub fn new(params: QuadDetectorParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self { params })
    }

    #[inline]
    pub fn params(&self) -> &QuadDetectorParams {
        &self.params
    }

    /// Detect inside `region` of a color frame; points are in full-frame
    /// pixel coordinates.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame), fields(w = region.width, h = region.height))
    )]
    pub fn detect(&self, frame: &ColorImageView<'_>, region: Rect) -> Option<Quad> {
        let region = region.clamp_to(frame.width, frame.height);
        if region.width < MIN_REGION_SIDE || region.height < MIN_REGION_SIDE {
            log::trace!("search region {region:?} too small");
            return None;
        }
        let gray = luminance_crop(frame, region);
        self.detect_in_crop(&gray, region)
    }

    /// Same as [`QuadDetector::detect`] for single-channel input.
    pub fn detect_gray(&self, frame: &GrayImageView<'_>, region: Rect) -> Option<Quad> {
        self.detect(&ColorImageView::from_gray(*frame), region)
    }

    fn detect_in_crop(&self, gray: &GrayImage, region: Rect) -> Option<Quad> {
        let p = &self.params;
        let blurred = gaussian_blur(gray, p.blur_kernel);

        let threshold = compute_threshold(&blurred, p)?;
        if threshold < p.safety_floor {
            log::trace!("threshold {threshold} below safety floor {}", p.safety_floor);
            return None;
        }

        let mut mask = close(&binarize(&blurred, threshold), p.close_kernel);
        for _ in 0..p.dilate_iterations {
            mask = dilate(&mask, 3);
        }

        let min_area = p.min_area_frac as f64 * region.area() as f64;
        let contour = external_contours(&mask, min_area.floor() as usize)
            .into_iter()
            .filter(|c| c.area >= min_area)
            .max_by(|a, b| a.area.total_cmp(&b.area))?;

        let outline: Vec<Point2<f64>> = contour
            .points
            .iter()
            .map(|q| Point2::new(q.x as f64, q.y as f64))
            .collect();
        let outline = if p.use_convex_hull {
            convex_hull(&outline)
        } else {
            outline
        };

        let perimeter = closed_perimeter(&outline);
        let mut poly = approx_closed_polygon(&outline, p.approx_epsilon_frac as f64 * perimeter);
        if poly.len() != 4 {
            log::trace!("approximation gave {} vertices, retrying", poly.len());
            poly = approx_closed_polygon(&outline, p.approx_retry_epsilon_frac as f64 * perimeter);
        }
        if poly.len() != 4 {
            log::trace!("no 4-vertex polygon ({} vertices)", poly.len());
            return None;
        }

        let (ox, oy) = (region.x as f32, region.y as f32);
        let quad = Quad::new([0, 1, 2, 3].map(|i| {
            Point2::new(poly[i].x as f32 + ox, poly[i].y as f32 + oy)
        }));
        if !quad.is_convex() || (quad.area() as f64) < min_area {
            log::trace!("rejected quad {:?}", quad.points);
            return None;
        }
        log::trace!(
            "quad found: t={threshold} area={:.0} region={region:?}",
            quad.area()
        );
        Some(quad)
    }
}
