//! Adapters from `image` buffers to the tracker's view types.

use crate::{FrameResult, MarkerTracker};
use planar_tracker_core::{ColorImageView, GrayImageView, PixelLayout};

/// Borrow an `image::GrayImage` as a [`GrayImageView`].
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Borrow an `image::RgbImage` as a [`ColorImageView`].
pub fn color_view(img: &::image::RgbImage) -> ColorImageView<'_> {
    ColorImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        layout: PixelLayout::Rgb8,
        data: img.as_raw(),
    }
}

/// Run one RGB frame through `tracker`.
pub fn process_rgb_image(tracker: &mut MarkerTracker, img: &::image::RgbImage) -> FrameResult {
    tracker.process_frame(&color_view(img))
}

/// Run one grayscale frame through `tracker`.
pub fn process_gray_image(tracker: &mut MarkerTracker, img: &::image::GrayImage) -> FrameResult {
    tracker.process_frame(&ColorImageView::from_gray(gray_view(img)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{GrayImage, Rgb, RgbImage};

    #[test]
    fn views_share_buffer_and_size() {
        let mut rgb = RgbImage::new(4, 3);
        rgb.put_pixel(1, 2, Rgb([255, 255, 255]));
        let view = color_view(&rgb);
        assert_eq!((view.width, view.height), (4, 3));
        assert_eq!(view.luma(1, 2), 255);
        assert_eq!(view.luma(0, 0), 0);

        let gray = GrayImage::from_pixel(5, 2, ::image::Luma([7]));
        let g = gray_view(&gray);
        assert_eq!((g.width, g.height, g.data.len()), (5, 2, 10));
    }
}
