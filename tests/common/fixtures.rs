use image::codecs::gif::GifEncoder;
use image::{Frame, GrayAlphaImage, LumaA, Rgb, RgbImage, Rgba, RgbaImage};
use mediaminer::{FileReport, PipelineConfig};
use std::fs::File;
use std::path::{Path, PathBuf};

pub const WIDTH: u32 = 80;
pub const HEIGHT: u32 = 60;

/// A dark 20x20 square on a light background, top-left at (x, y)
pub fn square_scene(x: u32, y: u32) -> RgbImage {
    RgbImage::from_fn(WIDTH, HEIGHT, |px, py| {
        if (x..x + 20).contains(&px) && (y..y + 20).contains(&py) {
            Rgb([20, 20, 20])
        } else {
            Rgb([230, 230, 230])
        }
    })
}

/// Creates parent directories of `rel` under `root` and returns the full path
fn prepare(root: &Path, rel: &str) -> PathBuf {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    path
}

/// Writes a PNG with one square in it
pub fn write_square_png(root: &Path, rel: &str) -> PathBuf {
    let path = prepare(root, rel);
    square_scene(30, 20).save(&path).expect("Failed to save test image");
    path
}

/// Writes a uniform PNG with nothing to detect
pub fn write_blank_png(root: &Path, rel: &str) -> PathBuf {
    let path = prepare(root, rel);
    RgbImage::from_pixel(WIDTH, HEIGHT, Rgb([128, 128, 128]))
        .save(&path)
        .expect("Failed to save test image");
    path
}

/// Writes a gray+alpha PNG, a channel layout the pipeline rejects
pub fn write_gray_alpha_png(root: &Path, rel: &str) -> PathBuf {
    let path = prepare(root, rel);
    GrayAlphaImage::from_pixel(16, 16, LumaA([90, 255]))
        .save(&path)
        .expect("Failed to save test image");
    path
}

/// Writes an animated GIF whose square moves right by 5px per frame
pub fn write_moving_square_gif(root: &Path, rel: &str, frames: usize) -> PathBuf {
    let path = prepare(root, rel);
    let file = File::create(&path).expect("Failed to create test video");
    let mut encoder = GifEncoder::new(file);
    for i in 0..frames {
        let rgb = square_scene(15 + 5 * i as u32, 20);
        let rgba = RgbaImage::from_fn(WIDTH, HEIGHT, |x, y| {
            let p = rgb.get_pixel(x, y);
            Rgba([p[0], p[1], p[2], 255])
        });
        encoder.encode_frame(Frame::new(rgba)).expect("Failed to encode frame");
    }
    path
}

/// Writes a file no decoder understands
pub fn write_text_file(root: &Path, rel: &str) -> PathBuf {
    let path = prepare(root, rel);
    std::fs::write(&path, "just some notes\n").expect("Failed to write text file");
    path
}

/// Writes a pipeline document and returns its path
pub fn write_config(dir: &Path, yaml: &str) -> PathBuf {
    let path = dir.join("pipeline.yaml");
    std::fs::write(&path, yaml).expect("Failed to write pipeline document");
    path
}

pub fn config(yaml: &str) -> PipelineConfig {
    PipelineConfig::from_yaml_str(yaml).expect("Invalid test pipeline")
}

pub fn read_report(path: &Path) -> FileReport {
    let file = File::open(path).expect("Missing report");
    serde_json::from_reader(file).expect("Invalid report")
}

/// Blob detection feeding the tone classifier, reported as JSON
pub const DETECT_AND_CLASSIFY: &str = r#"
pipeline:
  - type: contourdetector
    name: blobs
    inputs: [files]
    params: { outputlabel: blob }
  - type: toneclassifier
    name: tone
    inputs: [blobs]
    params: { triggerlabels: [all], strategies: [mean, median, otsu], outputlabel: mostvotes }
  - type: jsonreportwriter
    name: report
    inputs: [blobs, tone]
"#;

/// Only a report of the raw frames
pub const REPORT_ONLY: &str = r#"
pipeline:
  - type: contourdetector
    name: blobs
    inputs: [files]
    params: { outputlabel: blob }
  - type: jsonreportwriter
    name: report
    inputs: [blobs]
"#;
