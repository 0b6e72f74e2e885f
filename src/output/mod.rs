//! Output stages: annotated media writers and the JSON report writer.

pub mod annotate;
pub mod frames;
pub mod photo;
pub mod report;
pub mod video;

pub use annotate::{AnnotateParams, Annotator};
pub use frames::FrameWriter;
pub use photo::PhotoWriter;
pub use report::JsonReportWriter;
pub use video::{VideoWriter, VideoWriterParams};

use crate::error::ConfigError;
use image::ImageFormat;
use std::path::{Path, PathBuf};

/// Path of an output artifact for `file`.
///
/// The output tree mirrors the input tree below `input_root`; the file name
/// is the input base name followed by `suffix` and `.extension`. Missing
/// directories are created.
pub fn output_path(
    file: &Path,
    input_root: &Path,
    output_root: &Path,
    suffix: &str,
    extension: &str,
) -> std::io::Result<PathBuf> {
    let relative = match file.strip_prefix(input_root) {
        Ok(rel) => rel,
        Err(_) => Path::new(file.file_name().unwrap_or(file.as_os_str())),
    };
    let stem = relative
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let dir = match relative.parent() {
        Some(parent) => output_root.join(parent),
        None => output_root.to_path_buf(),
    };
    std::fs::create_dir_all(&dir)?;

    Ok(dir.join(format!("{}{}.{}", stem, suffix, extension)))
}

/// Resolve a writer's `format` option to an image format
pub(crate) fn image_format(stage: &str, format: &str) -> Result<ImageFormat, ConfigError> {
    ImageFormat::from_extension(format).ok_or_else(|| ConfigError::Construction {
        stage: stage.to_string(),
        reason: format!("unsupported output format '{}'", format),
    })
}
