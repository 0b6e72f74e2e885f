use crate::detection::preprocessing;
use crate::error::ConfigError;
use crate::models::{Label, Region};
use crate::pipeline::{Detector, ScanArea};
use anyhow::{Context, Result, anyhow};
use ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use rten::Model;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Options of the `textrecognizer` stage type
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextRecognizerParams {
    /// Directory holding `text-detection.rten` and `text-recognition.rten`
    pub model: PathBuf,
    #[serde(default)]
    pub equalizehist: bool,
    #[serde(default)]
    pub triggerlabels: Vec<String>,
}

/// Load the OCR engine from a model directory
pub fn init_ocr_engine(models_dir: &Path) -> Result<OcrEngine> {
    if !models_dir.is_dir() {
        anyhow::bail!("invalid OCR model directory {}", models_dir.display());
    }

    let detection_model_path = models_dir.join(DETECTION_MODEL);
    let recognition_model_path = models_dir.join(RECOGNITION_MODEL);

    if !detection_model_path.exists() || !recognition_model_path.exists() {
        anyhow::bail!(
            "OCR models not found. Expected locations:\n  - {}\n  - {}",
            detection_model_path.display(),
            recognition_model_path.display()
        );
    }

    let detection_model = Model::load_file(&detection_model_path)?;
    let recognition_model = Model::load_file(&recognition_model_path)?;

    let engine = OcrEngine::new(OcrEngineParams {
        detection_model: Some(detection_model),
        recognition_model: Some(recognition_model),
        ..Default::default()
    })?;

    Ok(engine)
}

/// Recognizer that reads text in the scanned area.
///
/// Reports one region covering the area, labelled with the recognized text,
/// or nothing when no text is found.
pub struct TextRecognizer {
    engine: OcrEngine,
    equalize: bool,
}

impl TextRecognizer {
    pub fn new(stage: &str, params: TextRecognizerParams) -> Result<Self, ConfigError> {
        let engine = init_ocr_engine(&params.model).map_err(|e| ConfigError::Construction {
            stage: stage.to_string(),
            reason: format!("{:#}", e),
        })?;

        Ok(Self {
            engine,
            equalize: params.equalizehist,
        })
    }

    fn read_text(&self, area: ScanArea<'_>) -> Result<String> {
        let equalized;
        let img = if self.equalize {
            equalized = preprocessing::gray_to_rgb(&preprocessing::equalize(area.gray));
            &equalized
        } else {
            area.image
        };

        let img_source = ImageSource::from_bytes(img.as_raw(), img.dimensions())
            .map_err(|e| anyhow!("invalid OCR input: {:?}", e))?;
        let ocr_input = self.engine.prepare_input(img_source)?;
        let text = self.engine.get_text(&ocr_input)?;
        Ok(text.trim().to_string())
    }
}

impl Detector for TextRecognizer {
    fn scan(&mut self, area: ScanArea<'_>) -> Result<Vec<Region>> {
        let Some(bounds) = area.bounds() else {
            return Ok(Vec::new());
        };

        let text = self
            .read_text(area)
            .with_context(|| format!("OCR failed on {}x{} area", area.width(), area.height()))?;

        if text.is_empty() {
            debug!("No text in {}x{} area", area.width(), area.height());
            return Ok(Vec::new());
        }

        Ok(vec![Region::new(bounds, vec![Label::new(text).with_method("ocrs")])])
    }
}
