use crate::error::ConfigError;
use crate::models::StageOutput;
use crate::output::annotate::{AnnotateParams, Annotator};
use crate::output::{image_format, output_path};
use crate::pipeline::{FrameContext, Stage};
use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// Writes every video frame as `<base>-frame-<N>-annotated.<format>`; ignores photos
pub struct FrameWriter {
    name: String,
    annotator: Annotator,
    format: ImageFormat,
    extension: String,
}

impl FrameWriter {
    pub fn new(name: impl Into<String>, inputs: Vec<String>, params: AnnotateParams) -> Result<Self, ConfigError> {
        let name = name.into();
        let format = image_format(&name, &params.format)?;
        let annotator = Annotator::new(&name, inputs, params.font.as_deref(), params.size)?;
        Ok(Self {
            name,
            annotator,
            format,
            extension: params.format,
        })
    }
}

impl Stage for FrameWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, context: &FrameContext, input_root: &Path, output_root: &Path) -> Result<StageOutput> {
        if !context.is_video() {
            return Ok(StageOutput::default());
        }

        let img = self.annotator.render(&self.name, context)?;
        let suffix = format!("-frame-{}-annotated", context.frame);
        let path = output_path(&context.file, input_root, output_root, &suffix, &self.extension)?;
        img.save_with_format(&path, self.format)
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!("Wrote {}", path.display());
        Ok(StageOutput::file(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MediaKind;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn params() -> AnnotateParams {
        serde_yaml::from_str("{ format: png, size: { width: 8, height: 4 } }").unwrap()
    }

    fn frame(kind: MediaKind, index: usize) -> FrameContext {
        FrameContext::new(
            "/in/clips/run.gif",
            kind,
            index,
            RgbImage::from_pixel(16, 8, Rgb([9, 9, 9])),
            GrayImage::from_pixel(16, 8, Luma([9])),
        )
    }

    #[test]
    fn writes_one_image_per_video_frame() {
        let out = tempfile::TempDir::new().unwrap();
        let mut writer = FrameWriter::new("frames", Vec::new(), params()).unwrap();

        for index in 0..2 {
            let result = writer
                .execute(&frame(MediaKind::Video, index), Path::new("/in"), out.path())
                .unwrap();
            let path = result.file.unwrap();
            assert_eq!(path, out.path().join(format!("clips/run-frame-{}-annotated.png", index)));
            assert_eq!(image::open(&path).unwrap().width(), 8);
        }
    }

    #[test]
    fn skips_photos() {
        let out = tempfile::TempDir::new().unwrap();
        let mut writer = FrameWriter::new("frames", Vec::new(), params()).unwrap();
        let result = writer
            .execute(&frame(MediaKind::Photo, 0), Path::new("/in"), out.path())
            .unwrap();
        assert_eq!(result, StageOutput::default());
    }
}
