use crate::detection::preprocessing;
use crate::error::ConfigError;
use crate::models::{Label, Region};
use crate::pipeline::{Detector, ScanArea};
use anyhow::Result;
use image::GrayImage;
use imageproc::contrast::otsu_level;
use serde::Deserialize;

/// One way of deciding whether an area is dark or light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneStrategy {
    /// Mean intensity against the threshold
    Mean,
    /// Median intensity against the threshold
    Median,
    /// Majority side of the Otsu split
    Otsu,
}

impl ToneStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ToneStrategy::Mean => "mean",
            ToneStrategy::Median => "median",
            ToneStrategy::Otsu => "otsu",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "mean" => Some(ToneStrategy::Mean),
            "median" => Some(ToneStrategy::Median),
            "otsu" => Some(ToneStrategy::Otsu),
            _ => None,
        }
    }

    /// 0 for dark, 1 for light
    fn classify(&self, gray: &GrayImage, threshold: u8) -> usize {
        let pixels = gray.as_raw();
        match self {
            ToneStrategy::Mean => {
                let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
                let mean = sum as f64 / pixels.len() as f64;
                usize::from(mean >= threshold as f64)
            }
            ToneStrategy::Median => {
                let mut sorted = pixels.clone();
                sorted.sort_unstable();
                usize::from(sorted[sorted.len() / 2] >= threshold)
            }
            ToneStrategy::Otsu => {
                let level = otsu_level(gray);
                let above = pixels.iter().filter(|&&p| p > level).count();
                usize::from(above * 2 > pixels.len())
            }
        }
    }
}

/// How per-strategy votes become labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// One label per strategy
    All,
    /// The label most strategies agree on
    MostVotes,
    /// Only the named strategy's label
    Single(ToneStrategy),
}

/// Options of the `toneclassifier` stage type
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToneClassifierParams {
    pub strategies: Vec<ToneStrategy>,
    pub outputlabel: String,
    #[serde(default = "default_threshold")]
    pub threshold: u8,
    /// Vocabulary for the dark and light classes, in that order
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub equalizehist: bool,
    #[serde(default)]
    pub triggerlabels: Vec<String>,
}

fn default_threshold() -> u8 {
    128
}

fn default_labels() -> Vec<String> {
    vec!["dark".to_string(), "light".to_string()]
}

/// Recognizer that labels an area as dark or light by combining strategies.
///
/// Reports a single region covering the whole scanned area.
#[derive(Debug, Clone)]
pub struct ToneClassifier {
    strategies: Vec<ToneStrategy>,
    mode: OutputMode,
    threshold: u8,
    labels: Vec<String>,
    equalize: bool,
}

impl ToneClassifier {
    pub fn new(stage: &str, params: ToneClassifierParams) -> Result<Self, ConfigError> {
        let invalid = |reason: String| ConfigError::Construction {
            stage: stage.to_string(),
            reason,
        };

        if params.strategies.is_empty() {
            return Err(invalid(
                "at least one strategy is required: mean|median|otsu".to_string(),
            ));
        }
        if params.labels.len() != 2 {
            return Err(invalid(format!(
                "labels must name exactly two classes, got {}",
                params.labels.len()
            )));
        }

        let mode = match params.outputlabel.as_str() {
            "all" => OutputMode::All,
            "mostvotes" => OutputMode::MostVotes,
            other => match ToneStrategy::from_name(other) {
                Some(s) if params.strategies.contains(&s) => OutputMode::Single(s),
                Some(s) => {
                    return Err(invalid(format!(
                        "outputlabel names '{}' but it is not among the strategies",
                        s.name()
                    )));
                }
                None => {
                    return Err(invalid(format!(
                        "outputlabel must be all, mostvotes or a strategy, got '{}'",
                        other
                    )));
                }
            },
        };

        Ok(Self {
            strategies: params.strategies,
            mode,
            threshold: params.threshold,
            labels: params.labels,
            equalize: params.equalizehist,
        })
    }

    fn labels_for(&self, gray: &GrayImage) -> Vec<Label> {
        let votes: Vec<(ToneStrategy, usize)> = self
            .strategies
            .iter()
            .map(|s| (*s, s.classify(gray, self.threshold)))
            .collect();

        match self.mode {
            OutputMode::All => votes
                .iter()
                .map(|(s, class)| Label::new(&self.labels[*class]).with_method(s.name()))
                .collect(),
            OutputMode::Single(strategy) => votes
                .iter()
                .filter(|(s, _)| *s == strategy)
                .map(|(s, class)| Label::new(&self.labels[*class]).with_method(s.name()))
                .collect(),
            OutputMode::MostVotes => {
                let light = votes.iter().filter(|(_, c)| *c == 1).count();
                let dark = votes.len() - light;
                // Ties go to whatever the first strategy said
                let winner = match light.cmp(&dark) {
                    std::cmp::Ordering::Greater => 1,
                    std::cmp::Ordering::Less => 0,
                    std::cmp::Ordering::Equal => votes[0].1,
                };
                let methods: Vec<&str> = votes
                    .iter()
                    .filter(|(_, c)| *c == winner)
                    .map(|(s, _)| s.name())
                    .collect();
                vec![Label::new(&self.labels[winner]).with_method(methods.join(","))]
            }
        }
    }
}

impl Detector for ToneClassifier {
    fn scan(&mut self, area: ScanArea<'_>) -> Result<Vec<Region>> {
        let Some(bounds) = area.bounds() else {
            return Ok(Vec::new());
        };

        let labels = if self.equalize {
            self.labels_for(&preprocessing::equalize(area.gray))
        } else {
            self.labels_for(area.gray)
        };

        Ok(vec![Region::new(bounds, labels)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rect;
    use image::Luma;

    fn classifier(yaml: &str) -> Result<ToneClassifier, ConfigError> {
        ToneClassifier::new("tone", serde_yaml::from_str(yaml).unwrap())
    }

    fn scan(classifier: &mut ToneClassifier, gray: &GrayImage) -> Vec<Region> {
        let rgb = preprocessing::gray_to_rgb(gray);
        classifier.scan(ScanArea { image: &rgb, gray }).unwrap()
    }

    #[test]
    fn reports_one_region_covering_the_area() {
        let mut c = classifier("{ strategies: [mean], outputlabel: mean }").unwrap();
        let regions = scan(&mut c, &GrayImage::from_pixel(12, 7, Luma([200])));
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].rect, Rect::new(0, 0, 12, 7).unwrap());
        assert_eq!(regions[0].labels, vec![Label::new("light").with_method("mean")]);
    }

    #[test]
    fn all_mode_labels_every_strategy() {
        let mut c = classifier("{ strategies: [mean, median], outputlabel: all, labels: [night, day] }").unwrap();
        let regions = scan(&mut c, &GrayImage::from_pixel(4, 4, Luma([10])));
        let labels: Vec<_> = regions[0]
            .labels
            .iter()
            .map(|l| (l.label.as_str(), l.method.as_deref()))
            .collect();
        assert_eq!(labels, [("night", Some("mean")), ("night", Some("median"))]);
    }

    #[test]
    fn most_votes_names_agreeing_strategies() {
        // Mostly dark with a few very bright pixels: the mean is pulled up, the median is not
        let mut gray = GrayImage::from_pixel(10, 10, Luma([20]));
        for x in 0..10 {
            for y in 0..4 {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
        let mut c = classifier("{ strategies: [mean, median, otsu], outputlabel: mostvotes, threshold: 100 }")
            .unwrap();
        let regions = scan(&mut c, &gray);
        assert_eq!(regions[0].labels.len(), 1);
        assert_eq!(regions[0].labels[0].label, "dark");
        assert_eq!(regions[0].labels[0].method.as_deref(), Some("median,otsu"));
    }

    #[test]
    fn construction_errors() {
        assert!(classifier("{ strategies: [], outputlabel: all }").is_err());
        assert!(classifier("{ strategies: [mean], outputlabel: otsu }").is_err());
        assert!(classifier("{ strategies: [mean], outputlabel: loudest }").is_err());
        assert!(classifier("{ strategies: [mean], outputlabel: all, labels: [a] }").is_err());
    }
}
