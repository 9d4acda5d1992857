use serde::{Deserialize, Serialize};

use crate::Rect;

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: u8) {
        self.data[y * self.width + x] = v;
    }
}

/// Channel layout of an interleaved 8-bit frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelLayout {
    Gray8,
    #[default]
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl PixelLayout {
    #[inline]
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Gray8 => 1,
            PixelLayout::Rgb8 | PixelLayout::Bgr8 => 3,
            PixelLayout::Rgba8 | PixelLayout::Bgra8 => 4,
        }
    }

    /// Offsets of the red, green and blue samples inside one pixel.
    #[inline]
    fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelLayout::Gray8 => [0, 0, 0],
            PixelLayout::Rgb8 | PixelLayout::Rgba8 => [0, 1, 2],
            PixelLayout::Bgr8 | PixelLayout::Bgra8 => [2, 1, 0],
        }
    }
}

/// Borrowed color frame, tightly packed, row-major.
#[derive(Clone, Copy, Debug)]
pub struct ColorImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub layout: PixelLayout,
    pub data: &'a [u8], // len = w*h*channels
}

impl<'a> ColorImageView<'a> {
    /// Wrap a raw buffer, checking its length against the dimensions.
    pub fn new(width: usize, height: usize, layout: PixelLayout, data: &'a [u8]) -> Option<Self> {
        let expected = width.checked_mul(height)?.checked_mul(layout.channels())?;
        (data.len() == expected).then_some(Self {
            width,
            height,
            layout,
            data,
        })
    }

    pub fn from_gray(view: GrayImageView<'a>) -> Self {
        Self {
            width: view.width,
            height: view.height,
            layout: PixelLayout::Gray8,
            data: view.data,
        }
    }

    #[inline]
    pub fn full_rect(&self) -> Rect {
        Rect::full(self.width, self.height)
    }

    /// BT.601 luma of one pixel, fixed point.
    #[inline]
    pub fn luma(&self, x: usize, y: usize) -> u8 {
        let ch = self.layout.channels();
        let base = (y * self.width + x) * ch;
        if ch == 1 {
            return self.data[base];
        }
        let [ro, go, bo] = self.layout.rgb_offsets();
        let r = self.data[base + ro] as u32;
        let g = self.data[base + go] as u32;
        let b = self.data[base + bo] as u32;
        ((r * 77 + g * 150 + b * 29 + 128) >> 8) as u8
    }
}

/// Convert the part of `frame` covered by `region` into a luminance image.
///
/// `region` is clamped to the frame first; an empty intersection yields an
/// empty image.
pub fn luminance_crop(frame: &ColorImageView<'_>, region: Rect) -> GrayImage {
    let r = region.clamp_to(frame.width, frame.height);
    if r.is_empty() {
        return GrayImage::new(0, 0);
    }
    let (x0, y0) = (r.x as usize, r.y as usize);
    let (w, h) = (r.width as usize, r.height as usize);
    let mut out = GrayImage::new(w, h);

    if frame.layout == PixelLayout::Gray8 {
        for y in 0..h {
            let src = (y0 + y) * frame.width + x0;
            out.data[y * w..(y + 1) * w].copy_from_slice(&frame.data[src..src + w]);
        }
        return out;
    }

    for y in 0..h {
        for x in 0..w {
            out.data[y * w + x] = frame.luma(x0 + x, y0 + y);
        }
    }
    out
}

#[inline]
fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    let x = x.clamp(0, src.width as i32 - 1);
    let y = y.clamp(0, src.height as i32 - 1);
    src.data[y as usize * src.width + x as usize]
}

/// Bilinear sample with clamp-to-edge addressing.
#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    if src.width == 0 || src.height == 0 {
        return 0.0;
    }
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffer() {
        let data = vec![0u8; 11];
        assert!(ColorImageView::new(2, 2, PixelLayout::Rgb8, &data).is_none());
        let data = vec![0u8; 12];
        assert!(ColorImageView::new(2, 2, PixelLayout::Rgb8, &data).is_some());
    }

    #[test]
    fn rgb_and_bgr_luma_agree() {
        let rgb = [200u8, 100, 50];
        let bgr = [50u8, 100, 200];
        let a = ColorImageView::new(1, 1, PixelLayout::Rgb8, &rgb).unwrap();
        let b = ColorImageView::new(1, 1, PixelLayout::Bgr8, &bgr).unwrap();
        assert_eq!(a.luma(0, 0), b.luma(0, 0));
        // 0.299*200 + 0.587*100 + 0.114*50 ~= 124.3
        assert!((a.luma(0, 0) as i32 - 124).abs() <= 1);
    }

    #[test]
    fn white_stays_white() {
        let px = [255u8, 255, 255, 255];
        let v = ColorImageView::new(1, 1, PixelLayout::Rgba8, &px).unwrap();
        assert_eq!(v.luma(0, 0), 255);
    }

    #[test]
    fn crop_is_clamped_to_frame() {
        let data: Vec<u8> = (0..16).collect();
        let gray = GrayImageView {
            width: 4,
            height: 4,
            data: &data,
        };
        let frame = ColorImageView::from_gray(gray);
        let crop = luminance_crop(
            &frame,
            Rect {
                x: 2,
                y: 2,
                width: 10,
                height: 10,
            },
        );
        assert_eq!((crop.width, crop.height), (2, 2));
        assert_eq!(crop.data, vec![10, 11, 14, 15]);
    }

    #[test]
    fn bilinear_interpolates_between_pixels() {
        let data = [0u8, 100, 0, 100];
        let v = GrayImageView {
            width: 2,
            height: 2,
            data: &data,
        };
        assert!((sample_bilinear(&v, 0.5, 0.5) - 50.0).abs() < 1e-4);
        // outside samples clamp to the edge
        assert!((sample_bilinear(&v, 5.0, 0.0) - 100.0).abs() < 1e-4);
    }
}
