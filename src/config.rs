use crate::error::ConfigError;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::Path;

/// Input source sentinel meaning "the raw decoded frame"
pub const INPUT_FILES: &str = "files";

/// Names a stage may not take: the input sentinel and the fixed keys of a
/// report frame
const RESERVED_NAMES: [&str; 4] = [INPUT_FILES, "frame", "file", "type"];

/// The pipeline document: an ordered list of stages plus run options
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Number of worker processes for directory runs (defaults to CPU count)
    #[serde(default)]
    pub workers: Option<usize>,
    pub pipeline: Vec<StageSpec>,
}

/// One entry of the pipeline document
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    /// Selects the implementation
    #[serde(rename = "type")]
    pub kind: String,
    /// Context key for this stage's output, and target of other stages' `inputs`
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub params: serde_yaml::Value,
}

impl StageSpec {
    /// Deserialize `params` into the typed options of this stage's type.
    /// A missing params block reads as an empty map.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ConfigError> {
        let value = match &self.params {
            serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
            other => other.clone(),
        };
        serde_yaml::from_value(value).map_err(|source| ConfigError::Params {
            stage: self.name.clone(),
            source,
        })
    }

    /// Stage names (not the `files` sentinel) this stage reads from
    pub fn stage_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .iter()
            .map(String::as_str)
            .filter(|i| *i != INPUT_FILES)
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(e, path.to_path_buf()))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check names are unique and unreserved, and every input refers to `files` or a stage
    /// declared earlier, which rules out cycles.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.is_empty() {
            return Err(ConfigError::Empty);
        }

        let mut declared: HashSet<&str> = HashSet::new();
        for spec in &self.pipeline {
            if RESERVED_NAMES.contains(&spec.name.as_str()) {
                return Err(ConfigError::ReservedName(spec.name.clone()));
            }
            for input in spec.stage_inputs() {
                if !declared.contains(input) {
                    return Err(ConfigError::InvalidInput {
                        stage: spec.name.clone(),
                        input: input.to_string(),
                    });
                }
            }
            if !declared.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateName(spec.name.clone()));
            }
        }

        Ok(())
    }
}
