use crate::error::ConfigError;
use crate::models::StageOutput;
use crate::output::annotate::{AnnotateParams, Annotator};
use crate::output::{image_format, output_path};
use crate::pipeline::{FrameContext, Stage};
use anyhow::{Context, Result};
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// Writes `<base>-annotated.<format>` for every photo; ignores videos
pub struct PhotoWriter {
    name: String,
    annotator: Annotator,
    format: ImageFormat,
    extension: String,
}

impl PhotoWriter {
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

impl Stage for PhotoWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, context: &FrameContext, input_root: &Path, output_root: &Path) -> Result<StageOutput> {
        if !context.is_photo() {
            return Ok(StageOutput::default());
        }

        let img = self.annotator.render(&self.name, context)?;
        let path = output_path(&context.file, input_root, output_root, "-annotated", &self.extension)?;
        img.save_with_format(&path, self.format)
            .with_context(|| format!("failed to write {}", path.display()))?;

        debug!("Wrote {}", path.display());
        Ok(StageOutput::file(path))
    }
}
