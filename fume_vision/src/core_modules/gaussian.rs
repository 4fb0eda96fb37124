// 5x5 Gaussian smoothing for grayscale frames.
//
// The kernel is the separable binomial [1, 4, 6, 4, 1] / 16 applied along rows and
// then columns. Samples outside the frame count as zero, so border pixels come out
// darker than the interior; the reference frame and every live frame go through
// the same filter, which keeps the difference of two identical frames at zero.
// All arithmetic is integer and the result is rounded once at the end.

use image::GrayImage;

const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];
const RADIUS: isize = 2;
/// log2 of the combined weight of both passes (16 * 16).
const NORMALIZE_SHIFT: u32 = 8;

pub fn gaussian_blur_5x5(image: &GrayImage) -> GrayImage {
    let width = image.width() as usize;
    let height = image.height() as usize;
    let source: &[u8] = image.as_raw();

    let mut horizontal = vec![0u32; width * height];
    for y in 0..height {
        let row = &source[y * width..(y + 1) * width];
        for x in 0..width {
            horizontal[y * width + x] = convolve(x, width, |index| row[index] as u32);
        }
    }

    let mut blurred = GrayImage::new(image.width(), image.height());
    let rounding = 1u32 << (NORMALIZE_SHIFT - 1);
    for (index, target) in blurred.iter_mut().enumerate() {
        let x = index % width;
        let y = index / width;
        let accumulated = convolve(y, height, |row| horizontal[row * width + x]);
        *target = ((accumulated + rounding) >> NORMALIZE_SHIFT) as u8;
    }
    blurred
}

/// Applies the 1D kernel centred on `position`, treating out-of-range samples as zero.
#[inline]
fn convolve(position: usize, length: usize, sample: impl Fn(usize) -> u32) -> u32 {
    let mut accumulated = 0u32;
    for (tap, weight) in KERNEL.iter().enumerate() {
        let offset = position as isize + tap as isize - RADIUS;
        if offset >= 0 && (offset as usize) < length {
            accumulated += weight * sample(offset as usize);
        }
    }
    accumulated
}
