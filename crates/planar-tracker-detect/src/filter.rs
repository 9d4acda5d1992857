//! Separable image filters: Gaussian blur and binary morphology.
//!
//! Borders replicate the edge pixel, so erosion never eats into shapes that
//! touch the search region boundary.

use planar_tracker_core::GrayImage;

/// Normalized 1D Gaussian with the OpenCV sigma for kernel size `k`.
fn gaussian_kernel(k: usize) -> Vec<f32> {
    let sigma = 0.3 * ((k as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let r = (k / 2) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-r..=r).map(|i| (-(i * i) as f32 / denom).exp()).collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

pub(crate) fn gaussian_blur(src: &GrayImage, k: usize) -> GrayImage {
    if k <= 1 || src.width == 0 || src.height == 0 {
        return src.clone();
    }
    let kernel = gaussian_kernel(k);
    let r = (k / 2) as isize;
    let (w, h) = (src.width, src.height);

    let mut tmp = vec![0f32; w * h];
    for y in 0..h {
        let row = &src.data[y * w..(y + 1) * w];
        for x in 0..w {
            let mut acc = 0f32;
            for (i, &kv) in kernel.iter().enumerate() {
                let xx = (x as isize + i as isize - r).clamp(0, w as isize - 1) as usize;
                acc += kv * row[xx] as f32;
            }
            tmp[y * w + x] = acc;
        }
    }

    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0f32;
            for (i, &kv) in kernel.iter().enumerate() {
                let yy = (y as isize + i as isize - r).clamp(0, h as isize - 1) as usize;
                acc += kv * tmp[yy * w + x];
            }
            out.data[y * w + x] = (acc + 0.5).clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// `255` where `value > threshold`, else `0`.
pub(crate) fn binarize(src: &GrayImage, threshold: u8) -> GrayImage {
    GrayImage {
        width: src.width,
        height: src.height,
        data: src
            .data
            .iter()
            .map(|&v| if v > threshold { 255 } else { 0 })
            .collect(),
    }
}

#[derive(Clone, Copy)]
enum Morph {
    Dilate,
    Erode,
}

fn rank_pass(src: &GrayImage, radius: usize, horizontal: bool, op: Morph) -> GrayImage {
    let (w, h) = (src.width, src.height);
    let mut out = GrayImage::new(w, h);
    let r = radius as isize;
    for y in 0..h {
        for x in 0..w {
            let mut acc = match op {
                Morph::Dilate => 0u8,
                Morph::Erode => 255u8,
            };
            for d in -r..=r {
                let v = if horizontal {
                    let xx = (x as isize + d).clamp(0, w as isize - 1) as usize;
                    src.data[y * w + xx]
                } else {
                    let yy = (y as isize + d).clamp(0, h as isize - 1) as usize;
                    src.data[yy * w + x]
                };
                acc = match op {
                    Morph::Dilate => acc.max(v),
                    Morph::Erode => acc.min(v),
                };
            }
            out.data[y * w + x] = acc;
        }
    }
    out
}

fn morph(src: &GrayImage, k: usize, op: Morph) -> GrayImage {
    if k <= 1 || src.width == 0 || src.height == 0 {
        return src.clone();
    }
    let tmp = rank_pass(src, k / 2, true, op);
    rank_pass(&tmp, k / 2, false, op)
}

/// Dilation with a `k x k` rectangle.
pub(crate) fn dilate(src: &GrayImage, k: usize) -> GrayImage {
    morph(src, k, Morph::Dilate)
}

/// Erosion with a `k x k` rectangle.
pub(crate) fn erode(src: &GrayImage, k: usize) -> GrayImage {
    morph(src, k, Morph::Erode)
}

/// Morphological close (dilate then erode) with a `k x k` rectangle.
pub(crate) fn close(src: &GrayImage, k: usize) -> GrayImage {
    erode(&dilate(src, k), k)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn gaussian_kernel_matches_opencv_sigma() {
        let k = gaussian_kernel(7);
        assert_eq!(k.len(), 7);
        let sum: f32 = k.iter().sum();
        assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-6);
        // sigma(7) = 1.4: center weight of a sampled, normalized Gaussian
        assert_abs_diff_eq!(k[3], 0.288, epsilon = 1e-3);
        assert_eq!(k[0], k[6]);
    }

    #[test]
    fn blur_preserves_flat_image() {
        let img = GrayImage::filled(9, 9, 77);
        assert_eq!(gaussian_blur(&img, 7), img);
    }

    #[test]
    fn close_fills_single_pixel_hole() {
        let mut img = GrayImage::filled(9, 9, 255);
        img.set(4, 4, 0);
        let closed = close(&img, 3);
        assert_eq!(closed.get(4, 4), 255);
    }

    #[test]
    fn dilate_grows_by_radius() {
        let mut img = GrayImage::new(9, 9);
        img.set(4, 4, 255);
        let d = dilate(&img, 3);
        assert_eq!(d.get(3, 3), 255);
        assert_eq!(d.get(5, 5), 255);
        assert_eq!(d.get(2, 4), 0);
    }

    #[test]
    fn binarize_is_strictly_greater() {
        let img = GrayImage {
            width: 3,
            height: 1,
            data: vec![99, 100, 101],
        };
        assert_eq!(binarize(&img, 100).data, vec![0, 0, 255]);
    }
}
