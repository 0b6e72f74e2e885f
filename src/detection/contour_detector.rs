use crate::detection::{circles, contours, preprocessing};
use crate::error::ConfigError;
use crate::models::{Label, Region};
use crate::pipeline::{Detector, ScanArea};
use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Any,
    Circle,
}

/// Options of the `contourdetector` stage type
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContourDetectorParams {
    /// Label attached to every detected region
    pub outputlabel: String,
    #[serde(default = "default_min_area")]
    pub min_area: u32,
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,
    #[serde(default = "default_low_threshold")]
    pub low_threshold: f32,
    #[serde(default = "default_high_threshold")]
    pub high_threshold: f32,
    #[serde(default)]
    pub shape: Shape,
    #[serde(default = "default_min_radius")]
    pub min_radius: f32,
    #[serde(default = "default_max_radius")]
    pub max_radius: f32,
    #[serde(default = "default_circularity_threshold")]
    pub circularity_threshold: f32,
    #[serde(default)]
    pub triggerlabels: Vec<String>,
}

fn default_min_area() -> u32 {
    10
}

fn default_blur_sigma() -> f32 {
    1.5
}

fn default_low_threshold() -> f32 {
    50.0
}

fn default_high_threshold() -> f32 {
    100.0
}

fn default_min_radius() -> f32 {
    10.0
}

fn default_max_radius() -> f32 {
    200.0
}

fn default_circularity_threshold() -> f32 {
    2.0
}

/// Finds outlined shapes: blur, Canny edges, connected components.
///
/// Each component's bounding box becomes one region labelled with the
/// configured output label; the label's confidence is the component's
/// fill ratio. With `shape: circle` only roughly round components of a
/// plausible radius are kept.
#[derive(Debug, Clone)]
pub struct ContourDetector {
    params: ContourDetectorParams,
}

impl ContourDetector {
    pub fn new(stage: &str, params: ContourDetectorParams) -> Result<Self, ConfigError> {
        let invalid = |reason: &str| ConfigError::Construction {
            stage: stage.to_string(),
            reason: reason.to_string(),
        };

        if params.outputlabel.is_empty() {
            return Err(invalid("outputlabel must not be empty"));
        }
        if params.blur_sigma <= 0.0 {
            return Err(invalid("blur_sigma must be positive"));
        }
        if params.low_threshold > params.high_threshold {
            return Err(invalid("low_threshold must not exceed high_threshold"));
        }
        if params.min_radius > params.max_radius {
            return Err(invalid("min_radius must not exceed max_radius"));
        }

        Ok(Self { params })
    }
}

impl Detector for ContourDetector {
    fn scan(&mut self, area: ScanArea<'_>) -> Result<Vec<Region>> {
        // Too small for the edge filter to say anything useful
        if area.width() < 3 || area.height() < 3 {
            return Ok(Vec::new());
        }

        let p = &self.params;
        let blurred = preprocessing::apply_blur(area.gray, p.blur_sigma);
        let edges = preprocessing::detect_edges(&blurred, p.low_threshold, p.high_threshold);
        let mut found = contours::find_contours(&edges, p.min_area);

        if p.shape == Shape::Circle {
            found = circles::filter_circles(found, p.min_radius, p.max_radius, p.circularity_threshold);
        }

        Ok(found
            .iter()
            .map(|c| {
                let label = Label::new(p.outputlabel.as_str())
                    .with_confidence(c.fill_ratio())
                    .with_method("contour");
                Region::new(c.rect(), vec![label])
            })
            .collect())
    }
}
