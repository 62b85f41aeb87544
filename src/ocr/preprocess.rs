//! Image enhancement transforms used before OCR.
//!
//! Every function borrows its input and returns a new image; nothing is
//! modified in place, so a stage can drop its input as soon as it has
//! produced its output.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

const BLACK: Rgba<u8> = Rgba([0, 0, 0, 255]);
const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// 3x3 sharpening kernel, row-major.
pub const SHARPEN_KERNEL: [i32; 9] = [0, -1, 0, -1, 5, -1, 0, -1, 0];

/// Converts any captured pixel layout into an owned RGBA8 buffer.
pub fn normalize(img: DynamicImage) -> RgbaImage {
    match img {
        DynamicImage::ImageRgba8(buffer) => buffer,
        other => other.to_rgba8(),
    }
}

/// Unweighted channel average of a pixel, 0.0–255.0.
///
/// Coloured glyphs are thresholded on the plain RGB mean, not perceptual luma.
fn luma(pixel: &Rgba<u8>) -> f32 {
    (pixel[0] as f32 + pixel[1] as f32 + pixel[2] as f32) / 3.0
}

/// Average luminance of an image. Returns 0.0 for an empty image.
pub fn mean_luminance(img: &RgbaImage) -> f32 {
    if img.width() == 0 || img.height() == 0 {
        return 0.0;
    }

    let total: f64 = img.pixels().map(|p| luma(p) as f64).sum();
    (total / (img.width() as f64 * img.height() as f64)) as f32
}

/// Converts image to pure black and white.
///
/// Pixels brighter than `threshold` become white, everything else black.
pub fn binarize(img: &RgbaImage, threshold: f32) -> RgbaImage {
    let (width, height) = img.dimensions();
    let mut output = RgbaImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let value = if luma(pixel) > threshold { WHITE } else { BLACK };
        output.put_pixel(x, y, value);
    }

    output
}

/// Binarizes at `ratio` of the image's own mean luminance.
pub fn binarize_adaptive(img: &RgbaImage, ratio: f32) -> RgbaImage {
    binarize(img, mean_luminance(img) * ratio)
}

fn is_black(pixel: &Rgba<u8>) -> bool {
    pixel[0] == 0 && pixel[1] == 0 && pixel[2] == 0
}

/// Applies a 3x3 neighbourhood rule to a binary image.
///
/// Border pixels have an incomplete neighbourhood and are copied unchanged.
fn morph3x3(img: &RgbaImage, keep_black: impl Fn(usize) -> bool) -> RgbaImage {
    let (width, height) = img.dimensions();
    let mut output = img.clone();
    if width < 3 || height < 3 {
        return output;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut black = 0;
            for dy in 0..3 {
                for dx in 0..3 {
                    if is_black(img.get_pixel(x + dx - 1, y + dy - 1)) {
                        black += 1;
                    }
                }
            }
            output.put_pixel(x, y, if keep_black(black) { BLACK } else { WHITE });
        }
    }

    output
}

/// Shrinks black regions: a pixel stays black only if its whole 3x3
/// neighbourhood is black. Removes isolated specks.
pub fn erode(img: &RgbaImage) -> RgbaImage {
    morph3x3(img, |black| black == 9)
}

/// Grows black regions: a pixel becomes black if any 3x3 neighbour is black.
pub fn dilate(img: &RgbaImage) -> RgbaImage {
    morph3x3(img, |black| black > 0)
}

/// Convolves the RGB channels with [`SHARPEN_KERNEL`], clamping to 0–255.
/// Alpha and the one-pixel border are copied unchanged.
pub fn sharpen(img: &RgbaImage) -> RgbaImage {
    let (width, height) = img.dimensions();
    let mut output = img.clone();
    if width < 3 || height < 3 {
        return output;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut acc = [0i32; 3];
            for ky in 0..3 {
                for kx in 0..3 {
                    let weight = SHARPEN_KERNEL[(ky * 3 + kx) as usize];
                    if weight == 0 {
                        continue;
                    }
                    let p = img.get_pixel(x + kx - 1, y + ky - 1);
                    for (c, sum) in acc.iter_mut().enumerate() {
                        *sum += p[c] as i32 * weight;
                    }
                }
            }
            let alpha = img.get_pixel(x, y)[3];
            output.put_pixel(
                x,
                y,
                Rgba([
                    acc[0].clamp(0, 255) as u8,
                    acc[1].clamp(0, 255) as u8,
                    acc[2].clamp(0, 255) as u8,
                    alpha,
                ]),
            );
        }
    }

    output
}

/// Resizes by `factor` with bilinear filtering. Each side is at least 1px.
pub fn scale(img: &RgbaImage, factor: f32) -> RgbaImage {
    let width = ((img.width() as f32 * factor) as u32).max(1);
    let height = ((img.height() as f32 * factor) as u32).max(1);
    if (width, height) == img.dimensions() {
        return img.clone();
    }
    imageops::resize(img, width, height, FilterType::Triangle)
}

/// Scale factor that brings an image up to at least `target_width` x
/// `target_height`, and never less than `min_factor`.
pub fn upscale_factor(img: &RgbaImage, target_width: u32, target_height: u32, min_factor: f32) -> f32 {
    let sx = target_width as f32 / img.width().max(1) as f32;
    let sy = target_height as f32 / img.height().max(1) as f32;
    sx.max(sy).max(min_factor)
}

/// Linear contrast: `out = in * gain + offset` per RGB channel, clamped.
pub fn adjust_contrast(img: &RgbaImage, gain: f32, offset: f32) -> RgbaImage {
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (i as f32 * gain + offset).round().clamp(0.0, 255.0) as u8;
    }
    map_rgb(img, &lut)
}

/// Gamma correction: `out = 255 * (in / 255)^(1 / gamma)`.
///
/// Values of `gamma` above 1.0 brighten mid-tones.
pub fn adjust_gamma(img: &RgbaImage, gamma: f32) -> RgbaImage {
    let exponent = if gamma > 0.0 { 1.0 / gamma } else { 1.0 };
    let mut lut = [0u8; 256];
    for (i, v) in lut.iter_mut().enumerate() {
        *v = (255.0 * (i as f32 / 255.0).powf(exponent))
            .round()
            .clamp(0.0, 255.0) as u8;
    }
    map_rgb(img, &lut)
}

fn map_rgb(img: &RgbaImage, lut: &[u8; 256]) -> RgbaImage {
    let (width, height) = img.dimensions();
    RgbaImage::from_fn(width, height, |x, y| {
        let p = img.get_pixel(x, y);
        Rgba([
            lut[p[0] as usize],
            lut[p[1] as usize],
            lut[p[2] as usize],
            p[3],
        ])
    })
}

/// The full enhancement chain: adaptive binarization, erosion, dilation,
/// sharpening.
///
/// Erosion runs before dilation: that removes noise specks and then restores
/// stroke thickness. The reverse order would close gaps instead.
pub fn enhance(img: &RgbaImage, binarize_ratio: f32) -> RgbaImage {
    let binary = binarize_adaptive(img, binarize_ratio);
    let eroded = erode(&binary);
    drop(binary);
    let dilated = dilate(&eroded);
    drop(eroded);
    sharpen(&dilated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn white(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, WHITE)
    }

    fn black_count(img: &RgbaImage) -> usize {
        img.pixels().filter(|p| is_black(p)).count()
    }

    #[test]
    fn test_normalize_converts_gray() {
        let gray = GrayImage::from_pixel(4, 2, Luma([128]));
        let rgba = normalize(DynamicImage::ImageLuma8(gray));
        assert_eq!(rgba.dimensions(), (4, 2));
        assert_eq!(*rgba.get_pixel(0, 0), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_mean_luminance() {
        let mut img = white(2, 1);
        img.put_pixel(0, 0, BLACK);
        assert!((mean_luminance(&img) - 127.5).abs() < 0.01);
        assert_eq!(mean_luminance(&RgbaImage::new(0, 0)), 0.0);
    }

    #[test]
    fn test_binarize() {
        let mut img: RgbaImage = RgbaImage::new(3, 1);
        img.put_pixel(0, 0, Rgba([100, 100, 100, 255]));
        img.put_pixel(1, 0, Rgba([250, 250, 250, 255]));
        img.put_pixel(2, 0, Rgba([150, 150, 150, 255]));

        let result = binarize(&img, 140.0);

        assert_eq!(*result.get_pixel(0, 0), BLACK, "Dark pixel should become black");
        assert_eq!(*result.get_pixel(1, 0), WHITE, "Bright pixel should become white");
        assert_eq!(*result.get_pixel(2, 0), WHITE, "Pixel above threshold should become white");
    }

    #[test]
    fn test_binarize_uses_channel_average() {
        // Pure red averages 85; BT.601 luma would put it near 76.
        let img = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        assert_eq!(*binarize(&img, 80.0).get_pixel(0, 0), WHITE);
        assert_eq!(*binarize(&img, 85.0).get_pixel(0, 0), BLACK);
        assert!((mean_luminance(&img) - 85.0).abs() < 0.01);
    }

    #[test]
    fn test_binarize_adaptive_uses_mean() {
        // Mean luminance is ~166; 70% of that is ~116, so 100 goes black and 200 white.
        let mut img = RgbaImage::from_pixel(3, 1, Rgba([200, 200, 200, 255]));
        img.put_pixel(0, 0, Rgba([100, 100, 100, 255]));
        let result = binarize_adaptive(&img, 0.7);
        assert_eq!(*result.get_pixel(0, 0), BLACK);
        assert_eq!(*result.get_pixel(1, 0), WHITE);
    }

    #[test]
    fn test_erode_removes_isolated_pixel() {
        let mut img = white(5, 5);
        img.put_pixel(2, 2, BLACK);
        assert_eq!(black_count(&erode(&img)), 0);
    }

    #[test]
    fn test_erode_then_dilate_restores_block() {
        let mut img = white(9, 9);
        for y in 2..7 {
            for x in 2..7 {
                img.put_pixel(x, y, BLACK);
            }
        }
        // Stray speck far from the block.
        img.put_pixel(7, 1, BLACK);

        let opened = dilate(&erode(&img));
        assert_eq!(black_count(&opened), 25, "block restored, speck removed");
        assert!(is_black(opened.get_pixel(2, 2)));
        assert!(!is_black(opened.get_pixel(7, 1)));
    }

    #[test]
    fn test_dilate_then_erode_is_not_equivalent() {
        let mut img = white(7, 7);
        img.put_pixel(3, 3, BLACK);
        let closed = erode(&dilate(&img));
        let opened = dilate(&erode(&img));
        assert_ne!(black_count(&closed), black_count(&opened));
    }

    #[test]
    fn test_sharpen_flat_image_unchanged() {
        let img = RgbaImage::from_pixel(5, 5, Rgba([90, 90, 90, 255]));
        assert_eq!(sharpen(&img), img);
    }

    #[test]
    fn test_sharpen_boosts_center() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([50, 50, 50, 255]));
        img.put_pixel(1, 1, Rgba([100, 100, 100, 255]));
        // 5 * 100 - 4 * 50 = 300, clamped
        assert_eq!(*sharpen(&img).get_pixel(1, 1), Rgba([255, 255, 255, 255]));

        img.put_pixel(1, 1, Rgba([60, 60, 60, 255]));
        // 5 * 60 - 4 * 50 = 100
        assert_eq!(sharpen(&img).get_pixel(1, 1)[0], 100);
    }

    #[test]
    fn test_tiny_images_pass_through() {
        let img = RgbaImage::from_pixel(2, 2, BLACK);
        assert_eq!(erode(&img), img);
        assert_eq!(sharpen(&img), img);
    }

    #[test]
    fn test_scale() {
        let img = white(100, 40);
        assert_eq!(scale(&img, 0.5).dimensions(), (50, 20));
        assert_eq!(scale(&img, 3.0).dimensions(), (300, 120));
        assert_eq!(scale(&img, 0.001).dimensions(), (1, 1));
    }

    #[test]
    fn test_upscale_factor_has_floor() {
        let img = white(600, 400);
        assert_eq!(upscale_factor(&img, 1200, 800, 4.0), 4.0);
        let small = white(100, 50);
        assert_eq!(upscale_factor(&small, 1200, 800, 4.0), 16.0);
    }

    #[test]
    fn test_adjust_contrast() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([100, 20, 250, 7]));
        let out = adjust_contrast(&img, 1.5, -50.0);
        assert_eq!(*out.get_pixel(0, 0), Rgba([100, 0, 255, 7]));
    }

    #[test]
    fn test_adjust_gamma_brightens_midtones() {
        let img = RgbaImage::from_pixel(1, 1, Rgba([128, 0, 255, 255]));
        let out = adjust_gamma(&img, 1.2);
        assert!(out.get_pixel(0, 0)[0] > 128);
        assert_eq!(out.get_pixel(0, 0)[1], 0);
        assert_eq!(out.get_pixel(0, 0)[2], 255);
    }

    #[test]
    fn test_enhance_yields_binary_image() {
        let img = RgbaImage::from_fn(20, 20, |x, _| {
            if (8..12).contains(&x) {
                Rgba([30, 30, 30, 255])
            } else {
                Rgba([220, 220, 220, 255])
            }
        });
        let out = enhance(&img, 0.7);
        assert_eq!(out.dimensions(), (20, 20));
        assert!(out
            .pixels()
            .all(|p| *p == BLACK || *p == WHITE));
        assert!(is_black(out.get_pixel(10, 10)));
        assert!(!is_black(out.get_pixel(3, 10)));
    }
}
