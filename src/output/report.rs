use crate::models::{FileReport, FrameReport, StageOutput};
use crate::output::output_path;
use crate::pipeline::{FrameContext, Stage};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Collects the regions of its input stages for every frame of a file and
/// writes them as one `<base>.json` report when the file completes.
///
/// A photo is reported as a single frame with index 0.
pub struct JsonReportWriter {
    name: String,
    inputs: Vec<String>,
    report: Option<FileReport>,
}

impl JsonReportWriter {
    pub fn new(name: impl Into<String>, inputs: Vec<String>) -> Self {
        Self {
            name: name.into(),
            inputs,
            report: None,
        }
    }
}

impl Stage for JsonReportWriter {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&mut self, context: &FrameContext, _input_root: &Path, _output_root: &Path) -> Result<StageOutput> {
        let report = self.report.get_or_insert_with(|| FileReport {
            file: context.file.clone(),
            kind: context.kind,
            frames: Vec::new(),
        });

        let mut stages = IndexMap::new();
        for source in &self.inputs {
            let regions = match context.reports(source) {
                Some(regions) => regions.to_vec(),
                None => {
                    warn!(
                        "Stage '{}' takes input from '{}' but '{}' produced no reports for frame {}",
                        self.name, source, source, context.frame
                    );
                    Vec::new()
                }
            };
            stages.insert(source.clone(), regions);
        }

        report.frames.push(FrameReport {
            frame: if context.is_photo() { 0 } else { context.frame },
            stages,
        });

        Ok(StageOutput::default())
    }

    fn completed(&mut self, context: &FrameContext, input_root: &Path, output_root: &Path) -> Result<StageOutput> {
        let Some(report) = self.report.take() else {
            return Ok(StageOutput::default());
        };

        let path = output_path(&context.file, input_root, output_root, "", "json")?;
        let file = File::create(&path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &report)?;
        writer.flush()?;

        info!("Wrote report {} ({} frames)", path.display(), report.frames.len());
        Ok(StageOutput::file(path))
    }

    fn abandon(&mut self) {
        self.report = None;
    }
}
