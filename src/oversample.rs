// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Combining passes: averaging color passes, box downsampling spatially
//! oversampled images, and pixel doubling.

use image::{Rgb, Rgb32FImage, RgbImage};
use itertools::iproduct;

/// Per-channel mean of equally sized images, rounded.  `None` when
/// `images` is empty.
pub fn average_rgb8(images: &[RgbImage]) -> Option<RgbImage> {
    let first = images.first()?;
    if images.len() == 1 {
        return Some(first.clone());
    }
    let n = images.len() as u32;
    Some(RgbImage::from_fn(first.width(), first.height(), |x, y| {
        let mut sum = [0u32; 3];
        for image in images {
            let Rgb(p) = image.get_pixel(x, y);
            for (s, c) in sum.iter_mut().zip(p.iter()) {
                *s += u32::from(*c);
            }
        }
        Rgb([
            ((sum[0] + n / 2) / n) as u8,
            ((sum[1] + n / 2) / n) as u8,
            ((sum[2] + n / 2) / n) as u8,
        ])
    }))
}

/// Per-channel mean of equally sized floating point images.
pub fn average_rgb32f(images: &[Rgb32FImage]) -> Option<Rgb32FImage> {
    let first = images.first()?;
    if images.len() == 1 {
        return Some(first.clone());
    }
    let n = images.len() as f32;
    Some(Rgb32FImage::from_fn(first.width(), first.height(), |x, y| {
        let mut sum = [0f32; 3];
        for image in images {
            let Rgb(p) = image.get_pixel(x, y);
            for (s, c) in sum.iter_mut().zip(p.iter()) {
                *s += *c;
            }
        }
        Rgb([sum[0] / n, sum[1] / n, sum[2] / n])
    }))
}

/// Shrinks by `factor` in both directions, each output pixel being the
/// rounded mean of a `factor × factor` block.
pub fn downsample_rgb8(image: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return image.clone();
    }
    let n = factor * factor;
    RgbImage::from_fn(image.width() / factor, image.height() / factor, |x, y| {
        let mut sum = [0u32; 3];
        for (dy, dx) in iproduct!(0..factor, 0..factor) {
            let Rgb(p) = image.get_pixel(x * factor + dx, y * factor + dy);
            for (s, c) in sum.iter_mut().zip(p.iter()) {
                *s += u32::from(*c);
            }
        }
        Rgb([
            ((sum[0] + n / 2) / n) as u8,
            ((sum[1] + n / 2) / n) as u8,
            ((sum[2] + n / 2) / n) as u8,
        ])
    })
}

/// Floating point counterpart of [`downsample_rgb8`].
pub fn downsample_rgb32f(image: &Rgb32FImage, factor: u32) -> Rgb32FImage {
    if factor <= 1 {
        return image.clone();
    }
    let n = (factor * factor) as f32;
    Rgb32FImage::from_fn(image.width() / factor, image.height() / factor, |x, y| {
        let mut sum = [0f32; 3];
        for (dy, dx) in iproduct!(0..factor, 0..factor) {
            let Rgb(p) = image.get_pixel(x * factor + dx, y * factor + dy);
            for (s, c) in sum.iter_mut().zip(p.iter()) {
                *s += *c;
            }
        }
        Rgb([sum[0] / n, sum[1] / n, sum[2] / n])
    })
}

/// Doubles the image in both directions by repeating every pixel.
pub fn double_rgb8(image: &RgbImage) -> RgbImage {
    RgbImage::from_fn(image.width() * 2, image.height() * 2, |x, y| {
        *image.get_pixel(x / 2, y / 2)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn averaging_rounds_to_nearest() {
        let a = RgbImage::from_pixel(2, 2, Rgb([10, 0, 255]));
        let b = RgbImage::from_pixel(2, 2, Rgb([11, 1, 254]));
        let avg = average_rgb8(&[a, b]).unwrap();
        assert_eq!(avg.dimensions(), (2, 2));
        assert_eq!(*avg.get_pixel(1, 1), Rgb([11, 1, 255]));
        assert!(average_rgb8(&[]).is_none());
    }

    #[test]
    fn averaging_floats_is_the_mean() {
        let a = Rgb32FImage::from_pixel(1, 1, Rgb([1.0, 2.0, 0.0]));
        let b = Rgb32FImage::from_pixel(1, 1, Rgb([3.0, 2.0, 1.0]));
        let c = Rgb32FImage::from_pixel(1, 1, Rgb([2.0, 2.0, 2.0]));
        let avg = average_rgb32f(&[a, b, c]).unwrap();
        assert_eq!(*avg.get_pixel(0, 0), Rgb([2.0, 2.0, 1.0]));
    }

    #[test]
    fn downsampling_averages_blocks() {
        let image = RgbImage::from_fn(4, 2, |x, _| if x < 2 { Rgb([0, 0, 0]) } else { Rgb([255, 100, 1]) });
        let small = downsample_rgb8(&image, 2);
        assert_eq!(small.dimensions(), (2, 1));
        assert_eq!(*small.get_pixel(0, 0), Rgb([0, 0, 0]));
        assert_eq!(*small.get_pixel(1, 0), Rgb([255, 100, 1]));

        let checker = RgbImage::from_fn(2, 2, |x, y| if (x + y) % 2 == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) });
        assert_eq!(*downsample_rgb8(&checker, 2).get_pixel(0, 0), Rgb([128, 128, 128]));
    }

    #[test]
    fn downsampling_floats_keeps_energy() {
        let image = Rgb32FImage::from_fn(6, 3, |x, y| Rgb([(x + y) as f32, 1.0, 0.0]));
        let small = downsample_rgb32f(&image, 3);
        assert_eq!(small.dimensions(), (2, 1));
        assert_eq!(*small.get_pixel(0, 0), Rgb([2.0, 1.0, 0.0]));
        assert_eq!(downsample_rgb32f(&image, 1), image);
    }

    #[test]
    fn doubling_repeats_pixels() {
        let image = RgbImage::from_fn(2, 1, |x, _| Rgb([x as u8, 0, 0]));
        let big = double_rgb8(&image);
        assert_eq!(big.dimensions(), (4, 2));
        assert_eq!(*big.get_pixel(1, 1), Rgb([0, 0, 0]));
        assert_eq!(*big.get_pixel(2, 0), Rgb([1, 0, 0]));
    }
}
