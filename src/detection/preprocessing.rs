use image::{GrayImage, RgbImage};
use imageproc::contrast::equalize_histogram;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;

/// Apply Gaussian blur to reduce noise
pub fn apply_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    gaussian_blur_f32(img, sigma)
}

/// Detect edges using Canny edge detector
pub fn detect_edges(img: &GrayImage, low_threshold: f32, high_threshold: f32) -> GrayImage {
    canny(img, low_threshold, high_threshold)
}

/// Spread the intensity histogram over the full range
pub fn equalize(img: &GrayImage) -> GrayImage {
    equalize_histogram(img)
}

/// Expand a grayscale image to three identical channels
pub fn gray_to_rgb(img: &GrayImage) -> RgbImage {
    image::DynamicImage::ImageLuma8(img.clone()).to_rgb8()
}
