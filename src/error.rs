use std::path::PathBuf;
use thiserror::Error;

// Pipeline document and stage construction errors, all fatal at start-up
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read pipeline file {1}: {0}")]
    Read(std::io::Error, PathBuf),
    #[error("Invalid pipeline document: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Pipeline has no stages")]
    Empty,
    #[error("Unknown stage type '{kind}' for stage '{stage}'")]
    UnknownStageType { stage: String, kind: String },
    #[error("Stage name '{0}' is reserved")]
    ReservedName(String),
    #[error("Duplicate stage name '{0}'")]
    DuplicateName(String),
    #[error("Stage '{stage}' takes input from '{input}', which is not declared before it")]
    InvalidInput { stage: String, input: String },
    #[error("Invalid params for stage '{stage}': {source}")]
    Params {
        stage: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Failed to construct stage '{stage}': {reason}")]
    Construction { stage: String, reason: String },
}

// Decoding and normalization errors, fatal for the file being processed
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Unsupported image layout with {0} channels")]
    UnsupportedChannels(u8),
    #[error("Failed to decode frame {frame}: {source}")]
    Frame {
        frame: usize,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Error, Debug)]
pub enum DistributorError {
    #[error("Failed to spawn worker {0}: {1}")]
    Spawn(usize, std::io::Error),
    #[error("Worker {0} failed to start: {1}")]
    Startup(usize, String),
    #[error("Lost connection to worker {0}: {1}")]
    Lost(usize, String),
    #[error("Failed to enumerate input directory {1}: {0}")]
    Enumerate(std::io::Error, PathBuf),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
