use crate::config::{PipelineConfig, StageSpec};
use crate::detection::{
    ContourDetector, ContourDetectorParams, TextRecognizer, TextRecognizerParams, ToneClassifier,
    ToneClassifierParams,
};
use crate::error::ConfigError;
use crate::output::{AnnotateParams, FrameWriter, JsonReportWriter, PhotoWriter, VideoWriter, VideoWriterParams};
use crate::pipeline::{DetectorStage, Stage};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Builds one stage from its pipeline entry
pub type StageFactory = Arc<dyn Fn(&StageSpec) -> Result<Box<dyn Stage>, ConfigError> + Send + Sync>;

/// Dispatch table from stage type tag to factory.
///
/// Cheap to clone, so every worker can build its own stages from the same table.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every stage type this crate ships
    pub fn builtin() -> Self {
        Self::new()
            .with("contourdetector", build_contour_detector)
            .with("textrecognizer", build_text_recognizer)
            .with("toneclassifier", build_tone_classifier)
            .with("photowriter", build_photo_writer)
            .with("framewriter", build_frame_writer)
            .with("videowriter", build_video_writer)
            .with("jsonreportwriter", build_json_report_writer)
    }

    pub fn with<F>(mut self, kind: &str, factory: F) -> Self
    where
        F: Fn(&StageSpec) -> Result<Box<dyn Stage>, ConfigError> + Send + Sync + 'static,
    {
        self.register(kind, factory);
        self
    }

    pub fn register<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn(&StageSpec) -> Result<Box<dyn Stage>, ConfigError> + Send + Sync + 'static,
    {
        self.factories.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn build_stage(&self, spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
        let factory = self
            .factories
            .get(&spec.kind)
            .ok_or_else(|| ConfigError::UnknownStageType {
                stage: spec.name.clone(),
                kind: spec.kind.clone(),
            })?;
        factory(spec)
    }

    /// Fresh instances of every stage in declaration order
    pub fn build(&self, config: &PipelineConfig) -> Result<Vec<Box<dyn Stage>>, ConfigError> {
        config.pipeline.iter().map(|spec| self.build_stage(spec)).collect()
    }
}

/// Stage names a writer reads; the `files` sentinel carries no reports
fn writer_inputs(spec: &StageSpec) -> Vec<String> {
    spec.stage_inputs().map(str::to_string).collect()
}

fn build_contour_detector(spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
    let params: ContourDetectorParams = spec.params()?;
    let triggers = params.triggerlabels.clone();
    let detector = ContourDetector::new(&spec.name, params)?;
    Ok(Box::new(DetectorStage::new(&spec.name, spec.inputs.clone(), triggers, detector)))
}

fn build_text_recognizer(spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
    let params: TextRecognizerParams = spec.params()?;
    let triggers = params.triggerlabels.clone();
    let detector = TextRecognizer::new(&spec.name, params)?;
    Ok(Box::new(DetectorStage::new(&spec.name, spec.inputs.clone(), triggers, detector)))
}

fn build_tone_classifier(spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
    let params: ToneClassifierParams = spec.params()?;
    let triggers = params.triggerlabels.clone();
    let detector = ToneClassifier::new(&spec.name, params)?;
    Ok(Box::new(DetectorStage::new(&spec.name, spec.inputs.clone(), triggers, detector)))
}

fn build_photo_writer(spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
    let params: AnnotateParams = spec.params()?;
    Ok(Box::new(PhotoWriter::new(&spec.name, writer_inputs(spec), params)?))
}

fn build_frame_writer(spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
    let params: AnnotateParams = spec.params()?;
    Ok(Box::new(FrameWriter::new(&spec.name, writer_inputs(spec), params)?))
}

fn build_video_writer(spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
    let params: VideoWriterParams = spec.params()?;
    Ok(Box::new(VideoWriter::new(&spec.name, writer_inputs(spec), params)?))
}

/// The report writer takes no options
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

fn build_json_report_writer(spec: &StageSpec) -> Result<Box<dyn Stage>, ConfigError> {
    let _: NoParams = spec.params()?;
    Ok(Box::new(JsonReportWriter::new(&spec.name, writer_inputs(spec))))
}
